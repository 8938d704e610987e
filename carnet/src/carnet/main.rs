use anyhow::{anyhow, Result};
use carnet::badge_rpc::db_ops::DbOpsImpl;
use carnet::badge_rpc::rpc::{self, BadgeImpl, MAX_RPC_BODY};
use carnet::cli;
use carnet::config::*;
use carnet::http_server::{start_public, PublicState};
use carnet::lifecycle::CredentialLifecycle;
use carnet::photo::{DbPhotoStore, FsPhotoStore, PhotoOp};
use carnet::utils::ensure_db_file;
use clap::{Arg, ArgAction, ArgMatches, Command};
use jsonrpsee::http_server::{HttpServerBuilder, HttpServerHandle, RpcModule};
use log::*;
use migration::Migrator;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::migrator::MigratorTrait;
use simplelog::*;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main()]
async fn main() {
    let worker_cmds = cli::worker_cmds().await;
    let qr_cmds = cli::qr_cmds().await;
    let audit_cmds = cli::audit_cmds().await;
    let app_m = Command::new("carnet")
        .version("0.1.0")
        .about("worker badge issuance and verification")
        .args(&[
            Arg::new("url")
                .long("url")
                .env("CARNET_URL")
                .global(true)
                .default_value("127.0.0.1:18890")
                .required(false)
                .help("specify url for admin api service"),
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .env("CARNET_LOG_LEVEL")
                .default_value("info")
                .help("set log level for application"),
            Arg::new("actor")
                .long("actor")
                .global(true)
                .env("CARNET_ACTOR")
                .takes_value(true)
                .required(false)
                .help("administrator recorded in the audit log"),
        ])
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("run daemon for provide service")
                .args(&[
                    Arg::new("db-dsn")
                        .long("db-dsn")
                        .env("CARNET_DSN")
                        .default_value("sqlite://carnet.db")
                        .help("specify database to store workers and credentials"),
                    Arg::new("verify-url")
                        .long("verify-url")
                        .env("CARNET_VERIFY_URL")
                        .default_value("0.0.0.0:18891")
                        .help("listen address of the public verification pages"),
                    Arg::new("public-base-url")
                        .long("public-base-url")
                        .env("CARNET_PUBLIC_BASE_URL")
                        .default_value("")
                        .help("external base url encoded in QR codes, defaults to http://<verify-url>"),
                    Arg::new("photo-storage")
                        .long("photo-storage")
                        .env("CARNET_PHOTO_STORAGE")
                        .default_value("fs")
                        .help("photo storage type (db, fs)"),
                    Arg::new("photo-path")
                        .long("photo-path")
                        .env("CARNET_PHOTO_PATH")
                        .default_value("photos")
                        .help("when photo storage is fs, directory holding the photos"),
                    Arg::new("debug-sql")
                        .long("debug-sql")
                        .env("CARNET_DEBUG_SQL")
                        .required(false)
                        .action(ArgAction::SetTrue)
                        .help("print sql to debug"),
                ]),
        )
        .subcommand(worker_cmds)
        .subcommand(qr_cmds)
        .subcommand(cli::verify_cmds())
        .subcommand(audit_cmds)
        .subcommand(cli::dashboard_cmds())
        .get_matches();

    let exec_result: Result<()> = match app_m.subcommand() {
        Some(("run", ref sub_m)) => start_server(sub_m).await,
        Some(("worker", ref sub_m)) => cli::worker_command(sub_m).await,
        Some(("qr", ref sub_m)) => cli::qr_command(sub_m).await,
        Some(("verify", ref sub_m)) => cli::verify_token(sub_m).await,
        Some(("audit", ref sub_m)) => cli::audit_command(sub_m).await,
        Some(("dashboard", ref sub_m)) => cli::dashboard(sub_m).await,
        _ => Ok(()),
    };

    if let Err(e) = exec_result {
        println!("{:?}", e);
        std::process::exit(1);
    }
}

async fn start_server(sub_m: &&ArgMatches) -> Result<()> {
    let flag = |name: &str| -> Result<String> {
        sub_m
            .get_one::<String>(name)
            .cloned()
            .ok_or_else(|| anyhow!("{} flag not found", name))
    };
    let debug_sql = *sub_m
        .get_one::<bool>("debug-sql")
        .ok_or_else(|| anyhow!("debug-sql flag not found"))?;

    let cfg = ServiceConfig::new(
        flag("url")?,
        flag("verify-url")?,
        flag("public-base-url")?,
        flag("db-dsn")?,
        flag("photo-storage")?,
        flag("photo-path")?,
        flag("log-level")?,
        debug_sql,
    );

    let lv = LevelFilter::from_str(cfg.log_level.as_str())?;
    TermLogger::init(
        lv,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    ensure_db_file(&cfg.db_dsn).await?;
    let mut opt = ConnectOptions::new(cfg.db_dsn.clone());
    opt.max_connections(10)
        .min_connections(5)
        .sqlx_logging(cfg.debug_sql)
        .max_lifetime(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8));

    let db_conn = Database::connect(opt).await?;
    Migrator::up(&db_conn, None).await?;
    let repo = Arc::new(DbOpsImpl::new(db_conn.clone()));
    let lifecycle = Arc::new(CredentialLifecycle::new(db_conn));

    let photos: Arc<dyn PhotoOp + Send + Sync> = match cfg.photo_storage {
        PhotoStorage::Db => Arc::new(DbPhotoStore::new(repo.clone())),
        PhotoStorage::Fs(ref path) => Arc::new(FsPhotoStore::new(path.clone())),
    };

    let rpc_module = rpc::register(
        repo.clone(),
        lifecycle,
        photos.clone(),
        cfg.public_base_url.clone(),
    );
    let (server_addr, handle) = start_api(cfg.url.as_str(), rpc_module).await?;
    info!("admin api listening {}", server_addr);

    let public_state = Arc::new(PublicState { repo, photos });
    let (public_addr, public_handle) = start_public(cfg.verify_url.as_str(), public_state).await?;
    info!(
        "verification pages listening {}, published as {}",
        public_addr, cfg.public_base_url
    );

    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sig_int.recv() => info!("receive SIGINT"),
        _ = sig_term.recv() => info!("receive SIGTERM"),
        _ = ctrl_c() => info!("receive Ctrl C"),
    }
    handle.stop()?;
    public_handle.stop().await;
    info!("Shutdown program");
    Ok(())
}

async fn start_api(
    url: &str,
    module: RpcModule<BadgeImpl>,
) -> Result<(SocketAddr, HttpServerHandle)> {
    let server = HttpServerBuilder::default()
        .max_request_body_size(MAX_RPC_BODY)
        .build(url.parse::<SocketAddr>()?)?;

    let addr = server.local_addr()?;
    let server_handle = server.start(module)?;

    Ok((addr, server_handle))
}
