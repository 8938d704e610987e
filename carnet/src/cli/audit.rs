use anyhow::{anyhow, Result};
use clap::value_parser;

use crate::badge_rpc::rpc::{get_badge_api, BadgeServiceRpcClient};
use crate::cli::utils::*;
use clap::{Arg, ArgMatches, Command};
use entity::audit_logs::Model as AuditEntry;
use tabled::builder::Builder;
use tabled::settings::style::Style;

pub async fn audit_cmds<'a>() -> Command<'a> {
    Command::new("audit")
        .arg_required_else_help(true)
        .about("audit log command")
        .subcommand(
            Command::new("list")
                .about("most recent audit entries first")
                .args(&[Arg::new("limit")
                    .long("limit")
                    .takes_value(true)
                    .value_parser(value_parser!(u64))
                    .default_value("100")
                    .help("entries to show, 1 to 1000")]),
        )
}

pub async fn audit_command(audit_m: &&ArgMatches) -> Result<()> {
    match audit_m.subcommand() {
        Some(("list", ref sub_m)) => list_audit_logs(sub_m).await,
        _ => Err(anyhow!("command not found")),
    }
}

pub fn dashboard_cmds<'a>() -> Command<'a> {
    Command::new("dashboard").about("worker and credential counters")
}

pub async fn list_audit_logs(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let limit = sub_m.get_one::<u64>("limit").copied();

    let server_api = get_badge_api(url).await?;
    let entries = server_api.list_audit_logs(limit).await?;
    print_audit_logs(entries)
}

pub async fn dashboard(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;

    let server_api = get_badge_api(url).await?;
    let stats = server_api.dashboard_stats().await?;

    let mut table = Builder::new();
    table
        .set_header(["Name", "Value"])
        .push_record(["Total", stats.total.to_string().as_str()])
        .push_record(["Active", stats.active.to_string().as_str()])
        .push_record(["Inactive", stats.inactive.to_string().as_str()])
        .push_record(["Expired", stats.expired.to_string().as_str()])
        .push_record(["WithQR", stats.with_qr.to_string().as_str()]);
    println!("{}", table.build().with(Style::ascii()));
    Ok(())
}

fn print_audit_logs(entries: Vec<AuditEntry>) -> Result<()> {
    let mut builder = Builder::new();

    builder.set_header(["Id", "Action", "Table", "RecordId", "By", "At", "NewData"]);
    for e in entries {
        let new_data = e.new_data.map(|v| v.to_string()).unwrap_or_default();
        builder.push_record([
            e.id.to_string().as_str(),
            e.action.to_string().as_str(),
            e.table_name.as_str(),
            e.record_id.as_deref().unwrap_or(""),
            e.performed_by.as_deref().unwrap_or(""),
            timestamp_to_string(e.performed_at).as_str(),
            short_msg(new_data, 40).as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::ascii()));
    Ok(())
}
