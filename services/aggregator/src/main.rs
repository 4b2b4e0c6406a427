//! Telesink aggregator service
//!
//! Drains metric, alarm and log records from the shared channel into files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use aggregator::{
    spawn_aggregators, validate_file, Aggregators, Emitter, Level, RuntimeSettings, SinkConfig,
};
use common::logging::{init_with_config, LogConfig};
use common::time::SystemTimeProvider;

/// Application log of the aggregator itself, under `log_path`
const SELF_LOG_FILE: &str = "alarm_kpi_aggregator.log";
const SELF_APP_NAME: &str = "AGGREGATOR";
const START_ALARM: &str = "APP_START";

#[derive(Parser, Debug)]
#[command(author, version, about = "Telesink aggregator - KPI, alarm and log file sink")]
struct Args {
    /// Alarm & KPI config file (json, toml or yaml)
    #[arg(short = 'c', long, env = "APP_LOG_CFG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Global log file name under log_path
    #[arg(long = "g-log", default_value = "app.log")]
    g_log: String,

    /// Enable debug level log lines
    #[arg(short = 'd', long)]
    debug: bool,

    /// Echo log lines to stdout
    #[arg(short = 'p', long)]
    stdout: bool,

    /// Directory for diagnostic logs (console only when unset)
    #[arg(long, env = "TELESINK_DIAG_DIR")]
    diag_dir: Option<PathBuf>,

    /// Validation mode - load and validate configuration, then exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = LogConfig {
        service_name: "aggregator".to_string(),
        log_dir: args.diag_dir.clone(),
        level: if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        },
        console: true,
    };
    if let Err(e) = init_with_config(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config.context(
        "Cannot find the log config file. Set it in the APP_LOG_CFG env or the -c argument",
    )?;
    let config = SinkConfig::load(&config_path)
        .with_context(|| format!("Load config {} failed", config_path.display()))?;

    if args.validate {
        print!("{}", config.dump());
        info!("Validation completed successfully");
        return Ok(());
    }

    let channel = config.open_channel().await?;
    let emitter = Emitter::new(
        channel.clone(),
        Arc::new(config.resolver()),
        &config.log_path,
    );
    emitter.set_debug(args.debug);
    emitter.set_stdout(args.stdout);
    emitter
        .init(SELF_LOG_FILE, SELF_APP_NAME)
        .with_context(|| format!("Failed to init log:\n{}", config.dump()))?;
    debug!("Emitter bound:\n{}", emitter.dump());

    let global_log = config.log_path.join(&args.g_log);
    if let Err(e) = validate_file(&global_log) {
        emitter
            .write_log(
                Level::Error,
                START_ALARM,
                &format!(
                    "Failed to write global log file [{}]: {}. Exit",
                    global_log.display(),
                    e
                ),
            )
            .await?;
        return Err(e.into());
    }

    let aggregators = match Aggregators::from_config(
        &config,
        channel,
        Arc::new(SystemTimeProvider),
        global_log,
    ) {
        Ok(aggregators) => aggregators,
        Err(e) => {
            emitter
                .write_log(
                    Level::Error,
                    START_ALARM,
                    &format!("Failed to create aggregators: {}. Exit", e),
                )
                .await?;
            return Err(e.into());
        },
    };

    let shutdown = CancellationToken::new();
    let handles = spawn_aggregators(aggregators, RuntimeSettings::default(), &shutdown);
    emitter
        .write_log(Level::Clean, START_ALARM, "application startup normally")
        .await?;

    common::shutdown::cancel_on_signal(shutdown.clone());
    shutdown.cancelled().await;
    handles.shutdown().await;
    emitter.info("Exit ...").await?;
    Ok(())
}
