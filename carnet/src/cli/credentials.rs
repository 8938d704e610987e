use anyhow::{anyhow, Result};

use crate::badge_rpc::rpc::{get_badge_api, BadgeServiceRpcClient};
use crate::cli::utils::*;
use crate::verify::{format_date, Verification};
use clap::{Arg, ArgMatches, Command};
use entity::credentials::Model as Credential;
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::style::Style;

pub async fn qr_cmds<'a>() -> Command<'a> {
    Command::new("qr")
        .arg_required_else_help(true)
        .about("qr credential command")
        .subcommand(
            Command::new("issue")
                .about("issue a credential, fails while the worker holds an active one")
                .args(&[Arg::new("worker-id")
                    .takes_value(true)
                    .required(true)
                    .help("worker id")]),
        )
        .subcommand(
            Command::new("revoke")
                .about("revoke a credential, revoking twice changes nothing")
                .args(&[Arg::new("id")
                    .takes_value(true)
                    .required(true)
                    .help("credential id")]),
        )
        .subcommand(
            Command::new("png")
                .about("save the active credential of a worker as a printable png")
                .args(&[
                    Arg::new("worker-id")
                        .takes_value(true)
                        .required(true)
                        .help("worker id"),
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .takes_value(true)
                        .default_value(".")
                        .help("directory to write QR_<internal id>_<last name>.png into"),
                ]),
        )
        .subcommand(
            Command::new("list")
                .about("credential history of a worker, newest first")
                .args(&[Arg::new("worker-id")
                    .takes_value(true)
                    .required(true)
                    .help("worker id")]),
        )
}

pub async fn qr_command(qr_m: &&ArgMatches) -> Result<()> {
    match qr_m.subcommand() {
        Some(("issue", ref sub_m)) => issue_credential(sub_m).await,
        Some(("revoke", ref sub_m)) => revoke_credential(sub_m).await,
        Some(("png", ref sub_m)) => save_qr_png(sub_m).await,
        Some(("list", ref sub_m)) => list_credentials(sub_m).await,
        _ => Err(anyhow!("command not found")),
    }
}

pub fn verify_cmds<'a>() -> Command<'a> {
    Command::new("verify")
        .about("evaluate a token the way the public page does")
        .args(&[Arg::new("token")
            .takes_value(true)
            .required(true)
            .help("credential token")])
}

pub async fn issue_credential(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let worker_id = get_arg(sub_m, "worker-id")?;

    let server_api = get_badge_api(url).await?;
    let issued = server_api
        .issue_credential(worker_id, get_actor(sub_m))
        .await?;

    let mut table = Builder::new();
    table
        .set_header(["Name", "Value"])
        .push_record(["Id", issued.credential.id.as_str()])
        .push_record(["WorkerId", issued.credential.worker_id.as_str()])
        .push_record(["Token", issued.credential.token.as_str()])
        .push_record(["Url", issued.verification_url.as_str()]);
    println!("{}", table.build().with(Style::ascii()));
    Ok(())
}

pub async fn revoke_credential(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let id = get_arg(sub_m, "id")?;

    let server_api = get_badge_api(url).await?;
    let credential = server_api.revoke_credential(id, get_actor(sub_m)).await?;
    println!(
        "credential {} revoked at {}",
        credential.id,
        opt_timestamp_to_string(credential.revoked_at)
    );
    Ok(())
}

pub async fn save_qr_png(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let worker_id = get_arg(sub_m, "worker-id")?;
    let output = get_arg(sub_m, "output")?;

    let server_api = get_badge_api(url).await?;
    let qr = server_api.credential_qr(worker_id).await?;
    let path = Path::new(&output).join(&qr.file_name);
    tokio::fs::write(&path, &qr.png.0)
        .await
        .map_err(|e| anyhow!("write {}: {}", path.display(), e))?;
    println!("{} -> {}", qr.verification_url, path.display());
    Ok(())
}

pub async fn list_credentials(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let worker_id = get_arg(sub_m, "worker-id")?;

    let server_api = get_badge_api(url).await?;
    let credentials = server_api.list_credentials(worker_id).await?;
    print_credentials(credentials)
}

pub async fn verify_token(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let token = get_arg(sub_m, "token")?;

    let server_api = get_badge_api(url).await?;
    let verification = server_api.verify(token).await?;
    print_verification(&verification)
}

fn print_credentials(credentials: Vec<Credential>) -> Result<()> {
    let mut builder = Builder::new();

    builder.set_header(["Id", "Token", "Revoked", "CreateAt", "RevokeAt", "CreatedBy"]);
    for c in credentials {
        builder.push_record([
            c.id.as_str(),
            short_msg(c.token.clone(), 16).as_str(),
            if c.is_revoked { "yes" } else { "no" },
            timestamp_to_string(c.created_at).as_str(),
            opt_timestamp_to_string(c.revoked_at).as_str(),
            c.created_by.as_deref().unwrap_or(""),
        ]);
    }
    println!("{}", builder.build().with(Style::ascii()));
    Ok(())
}

fn print_verification(v: &Verification) -> Result<()> {
    let mut table = Builder::new();
    table
        .set_header(["Name", "Value"])
        .push_record(["Verdict", v.verdict.as_str()])
        .push_record(["Message", v.message.as_str()]);
    if let Some(worker) = &v.worker {
        table
            .push_record(["Worker", worker.full_name().as_str()])
            .push_record(["InternalId", worker.internal_id.as_str()])
            .push_record(["ValidUntil", format_date(worker.valid_until).as_str()]);
    }
    println!("{}", table.build().with(Style::ascii()));
    Ok(())
}
