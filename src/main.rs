use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;

use vtable_dumper::logging::{self, SessionLog};
use vtable_dumper::{app, capture, device, util, Config, Database, DumpError, ServiceStore};

#[derive(Parser, Debug)]
#[command(version, about = "Dump the onTransact vtable of a binder service", long_about = None)]
struct Args {
    /// Service to dump, as listed by `service list`
    #[arg(short = 's', long = "service_name", visible_alias = "service-name")]
    service_name: String,

    /// adb serial of the device
    #[arg(short = 'd', long)]
    device: String,

    /// Config file (default: <data dir>/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Discovery store
    #[arg(long)]
    database: Option<PathBuf>,

    /// Root of the per-device output tree
    #[arg(long)]
    target_root: Option<PathBuf>,

    /// Shared id for devices running the same image
    #[arg(long)]
    meta_target: Option<String>,

    /// Agent script handed to the bridge
    #[arg(long)]
    agent_script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<DumpError>() {
                Some(DumpError::DeviceNotFound { connected, .. }) => {
                    eprintln!("{}", "device not connected!".red());
                    eprintln!("connected devices: {}", connected);
                    255
                }
                Some(dump_err) => {
                    eprintln!("{}", format!("[-] {dump_err}").red());
                    dump_err.exit_code()
                }
                None => {
                    eprintln!("{}", format!("[-] {err:#}").red());
                    255
                }
            };
            tracing::error!(error = %format!("{err:#}"), "vtable dump failed");
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    util::init_data_dir(None);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(path) = args.database {
        config = config.with_database_path(path);
    }
    if let Some(root) = args.target_root {
        config = config.with_target_root(root);
    }
    if args.meta_target.is_some() {
        config = config.with_meta_target(args.meta_target);
    }
    if let Some(script) = args.agent_script {
        config = config.with_agent_script(script);
    }

    logging::init(&config.log)
        .with_context(|| format!("failed to open log file {}", config.log.file.display()))?;
    tracing::info!(
        service = %args.service_name,
        device = %args.device,
        meta_target = ?config.meta_target,
        "Starting vtable dump"
    );

    // The store is consulted before any device is contacted
    let db = Database::open(config.database_path.clone()).map_err(DumpError::from)?;
    let store = ServiceStore::new(db.connection());
    let target = app::resolve_target(&store, &config, &args.service_name, &args.device)?;

    let devices = device::list_devices(&config.adb.binary).await?;
    device::select_device(&devices, &args.device)?;

    let log = SessionLog::new(&args.device);
    let (transport, stimulus) = app::production_collaborators(&config, &target);
    let report = app::dump(&config, target, transport, stimulus, log).await?;

    print!("{}", capture::render(&report.table));
    println!("{}", report.path.display());
    Ok(())
}
