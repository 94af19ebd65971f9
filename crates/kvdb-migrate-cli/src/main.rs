//! kvdb-migrate CLI - convert a node's databases to another storage backend.

use clap::Parser;
use kvdb_migrate::config::node_config_path;
use kvdb_migrate::{
    detect_backend, read_db_backend, update_db_backend, BackendCatalog, BackendType,
    MigrateError, MigrationConfig, MigrationResult, Orchestrator,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit status after SIGINT/SIGTERM.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "kvdb-migrate")]
#[command(about = "Convert a node's embedded databases to a different storage backend")]
#[command(version)]
struct Cli {
    /// Backend to convert to (goleveldb, cleveldb, rocksdb, badgerdb, redb)
    target_type: String,

    /// Node home directory containing data/ and config/
    #[arg(long, env = "KVDB_HOME", default_value = ".")]
    home: PathBuf,

    /// Backend of the existing databases [default: db_backend from config/config.toml]
    #[arg(long)]
    source_type: Option<String>,

    /// Directory to put the backup of the data directory in [default: home]
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Directory to build the converted data directory in [default: home]
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Batch size in megabytes; 0 writes each database in a single batch
    #[arg(long, default_value = "2048")]
    batch_size: u64,

    /// Seconds between status updates while converting (minimum 1)
    #[arg(long, default_value = "5")]
    status_period: u64,

    /// Build the converted data directory but do not swap it into place
    #[arg(long)]
    stage_only: bool,

    /// Dry run: validate and show plan without converting anything
    #[arg(long)]
    dry_run: bool,

    /// Do not update db_backend in config/config.toml after the swap
    #[arg(long)]
    skip_config_update: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let catalog = BackendCatalog::with_builtins();
    let target = catalog.require_named(&cli.target_type)?;
    let source = resolve_source(&cli, &catalog)?;

    if source == target {
        info!("Source and target backends are both {}. Nothing to do.", target);
        return Ok(());
    }

    let mut config =
        MigrationConfig::new(&cli.home, source, target).with_batch_size_mb(cli.batch_size);
    config.backup_dir = cli.backup_dir.clone();
    config.staging_dir = cli.staging_dir.clone();
    config.status_period_secs = cli.status_period;
    config.stage_only = cli.stage_only;

    // Plan (no filesystem changes)
    let plan_catalog = catalog.clone();
    let plan = join(tokio::task::spawn_blocking(move || {
        Orchestrator::new(&plan_catalog).plan(&config)
    }))
    .await?;

    if cli.dry_run {
        if cli.output_json {
            println!("{}", plan.to_json()?);
        } else {
            println!("\nDry run completed!");
            println!("{}", plan.summary());
        }
        return Ok(());
    }

    let staging = plan.staging_data_dir.clone();
    let stage_only = plan.config.stage_only;
    let worker = tokio::task::spawn_blocking(move || Orchestrator::new(&catalog).execute(&plan));
    let result = wait_or_interrupt(worker, &staging).await?;

    if !stage_only && !cli.skip_config_update {
        update_node_config(&cli.home, target)?;
    }

    print_result(&result, cli.output_json)?;
    Ok(())
}

/// Pick the source backend: flag, then node config, then detection on `application.db`.
fn resolve_source(cli: &Cli, catalog: &BackendCatalog) -> Result<BackendType, MigrateError> {
    if let Some(ref name) = cli.source_type {
        return name.parse();
    }

    if let Some(backend) = read_db_backend(&cli.home)? {
        info!(
            "Source backend {} read from {}",
            backend,
            node_config_path(&cli.home).display()
        );
        return Ok(backend);
    }

    let data_dir = cli.home.join("data");
    match detect_backend("application", &data_dir, catalog) {
        Some(backend) => {
            info!("Source backend {} detected from application database", backend);
            Ok(backend)
        }
        None => Err(MigrateError::Config(
            "could not determine the source backend; use --source-type".into(),
        )),
    }
}

fn update_node_config(home: &Path, target: BackendType) -> Result<(), MigrateError> {
    if !node_config_path(home).is_file() {
        warn!(
            "No node config at {}; set db_backend = \"{}\" before starting the node",
            node_config_path(home).display(),
            target
        );
        return Ok(());
    }
    update_db_backend(home, target)
}

fn print_result(result: &MigrationResult, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    let status_msg = if result.backup_dir.is_some() {
        "Migration completed!"
    } else {
        "Staging completed!"
    };
    println!("\n{}", status_msg);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Backends: {} -> {}",
        result.source_backend, result.target_backend
    );
    println!("  Databases: {}", result.databases.len());
    println!("  Entries: {}", result.entries_total);
    println!("  Copied entries: {}", result.copied.len());
    match result.backup_dir {
        Some(ref backup) => println!("  Backup: {}", backup.display()),
        None => println!("  Staging: {}", result.staging_dir.display()),
    }
    Ok(())
}

async fn join<T: Send + 'static>(
    handle: JoinHandle<Result<T, MigrateError>>,
) -> Result<T, MigrateError> {
    handle
        .await
        .map_err(worker_failed)?
}

fn worker_failed(e: tokio::task::JoinError) -> MigrateError {
    MigrateError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("migration worker failed: {}", e),
    ))
}

/// Wait for the migration worker, exiting with status 130 on SIGINT/SIGTERM.
///
/// The conversion cannot be stopped mid-flight, so an interrupt leaves the
/// staging directory behind.
async fn wait_or_interrupt(
    mut worker: JoinHandle<Result<MigrationResult, MigrateError>>,
    staging: &Path,
) -> Result<MigrationResult, MigrateError> {
    tokio::select! {
        joined = &mut worker => {
            return joined.map_err(worker_failed)?;
        }
        signal = shutdown_signal() => match signal {
            Ok(name) => {
                error!(
                    "Received {}. The staging directory might still exist: {}",
                    name,
                    staging.display()
                );
                eprintln!("\nReceived {}. Exiting.", name);
                std::process::exit(EXIT_INTERRUPTED);
            }
            Err(e) => warn!("Could not listen for shutdown signals: {}", e),
        },
    }

    join(worker).await
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity {:?}", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format {:?}", other)),
    }

    Ok(())
}

/// Resolve with the name of the first SIGINT or SIGTERM received.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Resolve on Ctrl-C (the only signal available off unix).
#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
