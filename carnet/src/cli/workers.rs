use anyhow::{anyhow, Result};
use std::str::FromStr;

use crate::badge_rpc::db_ops::{WorkerFilter, WorkerInput};
use crate::badge_rpc::rpc::{get_badge_api, BadgeServiceRpcClient};
use crate::cli::utils::*;
use crate::status::{effective_status, WorkerWithCredentials};
use crate::verify::today;
use clap::{Arg, ArgMatches, Command};
use entity::workers::Model as Worker;
use entity::WorkerStatus;
use tabled::builder::Builder;
use tabled::settings::style::Style;

fn field_args<'a>(required: bool) -> Vec<Arg<'a>> {
    [
        Arg::new("first-name")
            .long("first-name")
            .takes_value(true)
            .required(required)
            .help("first name"),
        Arg::new("last-name")
            .long("last-name")
            .takes_value(true)
            .required(required)
            .help("last name"),
        Arg::new("cedula")
            .long("cedula")
            .takes_value(true)
            .required(required)
            .help("national id number"),
        Arg::new("position")
            .long("position")
            .takes_value(true)
            .required(required)
            .help("job title"),
        Arg::new("department")
            .long("department")
            .takes_value(true)
            .required(required)
            .help("department"),
        Arg::new("phone")
            .long("phone")
            .takes_value(true)
            .help("phone number, empty to clear"),
        Arg::new("email")
            .long("email")
            .takes_value(true)
            .help("email address, empty to clear"),
        Arg::new("photo-url")
            .long("photo-url")
            .takes_value(true)
            .help("photo url, see `worker photo` to upload one"),
        Arg::new("status")
            .long("status")
            .takes_value(true)
            .help("ACTIVO, INACTIVO or VENCIDO"),
        Arg::new("valid-from")
            .long("valid-from")
            .takes_value(true)
            .required(required)
            .help("first valid day, YYYY-MM-DD"),
        Arg::new("valid-until")
            .long("valid-until")
            .takes_value(true)
            .required(required)
            .help("last valid day, YYYY-MM-DD"),
    ]
    .to_vec()
}

pub async fn worker_cmds<'a>() -> Command<'a> {
    Command::new("worker")
        .arg_required_else_help(true)
        .about("worker command")
        .subcommand(
            Command::new("list")
                .about("list workers, newest first")
                .args(&[
                    Arg::new("search")
                        .long("search")
                        .takes_value(true)
                        .help("match name, cedula or internal id"),
                    Arg::new("status")
                        .long("status")
                        .takes_value(true)
                        .help("ACTIVO, INACTIVO or VENCIDO"),
                ]),
        )
        .subcommand(
            Command::new("get").about("get worker detail").args(&[Arg::new("id")
                .takes_value(true)
                .required(true)
                .help("worker id")]),
        )
        .subcommand(
            Command::new("create")
                .about("register a worker")
                .args(field_args(true)),
        )
        .subcommand(
            Command::new("update")
                .about("edit a worker, omitted fields keep their value")
                .arg(
                    Arg::new("id")
                        .takes_value(true)
                        .required(true)
                        .help("worker id"),
                )
                .args(field_args(false)),
        )
        .subcommand(
            Command::new("delete")
                .about("soft delete a worker")
                .args(&[Arg::new("id")
                    .takes_value(true)
                    .required(true)
                    .help("worker id")]),
        )
        .subcommand(
            Command::new("photo")
                .about("upload a png, jpeg or webp photo and attach it to a worker")
                .args(&[
                    Arg::new("id")
                        .takes_value(true)
                        .required(true)
                        .help("worker id"),
                    Arg::new("file")
                        .takes_value(true)
                        .required(true)
                        .help("image file"),
                ]),
        )
}

pub async fn worker_command(worker_m: &&ArgMatches) -> Result<()> {
    match worker_m.subcommand() {
        Some(("list", ref sub_m)) => list_workers(sub_m).await,
        Some(("get", ref sub_m)) => get_worker(sub_m).await,
        Some(("create", ref sub_m)) => create_worker(sub_m).await,
        Some(("update", ref sub_m)) => update_worker(sub_m).await,
        Some(("delete", ref sub_m)) => delete_worker(sub_m).await,
        Some(("photo", ref sub_m)) => set_photo(sub_m).await,
        _ => Err(anyhow!("command not found")),
    }
}

fn parse_status(value: &str) -> Result<WorkerStatus> {
    WorkerStatus::from_str(value).map_err(|e| anyhow!(e))
}

/// Build the input from flags, every flag not given falls back to `base`
fn input_from_args(sub_m: &ArgMatches, base: Option<&Worker>) -> Result<WorkerInput> {
    let text = |name: &str, current: Option<&String>| -> Result<String> {
        sub_m
            .get_one::<String>(name)
            .or(current)
            .cloned()
            .ok_or_else(|| anyhow!("{} flag not found", name))
    };
    let optional = |name: &str, current: Option<&Option<String>>| -> Option<String> {
        match sub_m.get_one::<String>(name) {
            Some(v) => Some(v.clone()),
            None => current.cloned().flatten(),
        }
    };
    let date = |name: &str, current: Option<chrono::NaiveDate>| -> Result<chrono::NaiveDate> {
        match sub_m.get_one::<String>(name) {
            Some(v) => parse_date(v),
            None => current.ok_or_else(|| anyhow!("{} flag not found", name)),
        }
    };

    let status = match sub_m.get_one::<String>("status") {
        Some(v) => parse_status(v)?,
        None => base.map(|w| w.status).unwrap_or(WorkerStatus::Activo),
    };

    Ok(WorkerInput {
        first_name: text("first-name", base.map(|w| &w.first_name))?,
        last_name: text("last-name", base.map(|w| &w.last_name))?,
        cedula: text("cedula", base.map(|w| &w.cedula))?,
        position: text("position", base.map(|w| &w.position))?,
        department: text("department", base.map(|w| &w.department))?,
        phone: optional("phone", base.map(|w| &w.phone)),
        email: optional("email", base.map(|w| &w.email)),
        photo_url: optional("photo-url", base.map(|w| &w.photo_url)),
        status,
        valid_from: date("valid-from", base.map(|w| w.valid_from))?,
        valid_until: date("valid-until", base.map(|w| w.valid_until))?,
    })
}

/// Input that leaves every field of `worker` as it is
fn input_of(worker: &Worker) -> WorkerInput {
    WorkerInput {
        first_name: worker.first_name.clone(),
        last_name: worker.last_name.clone(),
        cedula: worker.cedula.clone(),
        position: worker.position.clone(),
        department: worker.department.clone(),
        phone: worker.phone.clone(),
        email: worker.email.clone(),
        photo_url: worker.photo_url.clone(),
        status: worker.status,
        valid_from: worker.valid_from,
        valid_until: worker.valid_until,
    }
}

pub async fn list_workers(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let status = match sub_m.get_one::<String>("status") {
        Some(v) => Some(parse_status(v)?),
        None => None,
    };
    let filter = WorkerFilter {
        search: sub_m.get_one::<String>("search").cloned(),
        status,
    };

    let server_api = get_badge_api(url).await?;
    let workers = server_api.list_workers(filter).await?;
    print_workers(workers)
}

pub async fn get_worker(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let id = get_arg(sub_m, "id")?;

    let server_api = get_badge_api(url).await?;
    let worker = server_api.get_worker(id).await?;
    print_one_worker(&worker)
}

pub async fn create_worker(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let input = input_from_args(sub_m, None)?;

    let server_api = get_badge_api(url).await?;
    let worker = server_api.create_worker(input, get_actor(sub_m)).await?;
    println!("worker {} created as {}", worker.id, worker.internal_id);
    Ok(())
}

pub async fn update_worker(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let id = get_arg(sub_m, "id")?;

    let server_api = get_badge_api(url).await?;
    let current = server_api.get_worker(id.clone()).await?;
    let input = input_from_args(sub_m, Some(&current.worker))?;
    let worker = server_api
        .update_worker(id, input, get_actor(sub_m))
        .await?;
    println!("worker {} updated", worker.id);
    Ok(())
}

pub async fn delete_worker(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let id = get_arg(sub_m, "id")?;

    let server_api = get_badge_api(url).await?;
    let worker = server_api.delete_worker(id, get_actor(sub_m)).await?;
    println!("worker {} deleted", worker.id);
    Ok(())
}

pub async fn set_photo(sub_m: &&ArgMatches) -> Result<()> {
    let url = get_url(sub_m)?;
    let id = get_arg(sub_m, "id")?;
    let file = get_arg(sub_m, "file")?;
    let data = tokio::fs::read(&file)
        .await
        .map_err(|e| anyhow!("read {}: {}", file, e))?;

    let server_api = get_badge_api(url).await?;
    let current = server_api.get_worker(id.clone()).await?;
    let photo_url = server_api.upload_photo(data).await?;
    let mut input = input_of(&current.worker);
    input.photo_url = Some(photo_url.clone());
    server_api
        .update_worker(id, input, get_actor(sub_m))
        .await?;
    println!("photo {}", photo_url);
    Ok(())
}

fn print_workers(workers: Vec<WorkerWithCredentials>) -> Result<()> {
    let today = today();
    let mut builder = Builder::new();

    builder.set_header([
        "Id",
        "InternalId",
        "Name",
        "Cedula",
        "Position",
        "Department",
        "Status",
        "ValidUntil",
        "QR",
    ]);

    for w in workers {
        builder.push_record([
            w.worker.id.as_str(),
            w.worker.internal_id.as_str(),
            short_msg(w.worker.full_name(), 30).as_str(),
            w.worker.cedula.as_str(),
            short_msg(w.worker.position.clone(), 20).as_str(),
            short_msg(w.worker.department.clone(), 20).as_str(),
            effective_status(&w.worker, today).as_str(),
            w.worker.valid_until.to_string().as_str(),
            if w.has_active_credential() { "yes" } else { "no" },
        ]);
    }
    println!("{}", builder.build().with(Style::ascii()));
    Ok(())
}

fn print_one_worker(w: &WorkerWithCredentials) -> Result<()> {
    let worker = &w.worker;
    let mut table = Builder::new();

    table
        .set_header(["Name", "Value"])
        .push_record(["Id", worker.id.as_str()])
        .push_record(["InternalId", worker.internal_id.as_str()])
        .push_record(["Name", worker.full_name().as_str()])
        .push_record(["Cedula", worker.cedula.as_str()])
        .push_record(["Position", worker.position.as_str()])
        .push_record(["Department", worker.department.as_str()])
        .push_record(["Phone", worker.phone.as_deref().unwrap_or("")])
        .push_record(["Email", worker.email.as_deref().unwrap_or("")])
        .push_record(["Photo", worker.photo_url.as_deref().unwrap_or("")])
        .push_record(["Status", worker.status.as_str()])
        .push_record(["Shown as", effective_status(worker, today()).as_str()])
        .push_record(["ValidFrom", worker.valid_from.to_string().as_str()])
        .push_record(["ValidUntil", worker.valid_until.to_string().as_str()])
        .push_record([
            "ActiveQR",
            w.active_credential().map(|c| c.id.as_str()).unwrap_or(""),
        ])
        .push_record(["CreatedBy", worker.created_by.as_deref().unwrap_or("")])
        .push_record(["CreateAt", timestamp_to_string(worker.created_at).as_str()])
        .push_record(["UpdateAt", timestamp_to_string(worker.updated_at).as_str()]);

    println!("{}", table.build().with(Style::ascii()));
    Ok(())
}
