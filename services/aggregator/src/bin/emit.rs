//! telesink-emit - send one record through the sink channel
//!
//! Operator and smoke-test companion of the aggregator: writes a log line
//! (optionally raising an alarm) or a KPI delta exactly as an application
//! would.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use aggregator::{Emitter, Level, SinkConfig};
use common::logging::{init_with_config, LogConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a log line, alarm or KPI delta to the telesink channel")]
struct Cli {
    /// Alarm & KPI config file (json, toml or yaml)
    #[arg(short = 'c', long, env = "APP_LOG_CFG", value_name = "FILE")]
    config: PathBuf,

    /// Application name written into log and alarm lines
    #[arg(short = 'a', long, default_value = "telesink-emit")]
    app: String,

    /// Log target: a file name under log_path, or "mq"
    #[arg(short = 't', long, default_value = "mq")]
    target: String,

    /// Echo log lines to stdout
    #[arg(short = 'p', long)]
    stdout: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a log line; levels above INFO raise the named alarm
    Log {
        /// DEBUG, INFO, CLEAN, EVENT, WARN, ERROR or FATAL
        level: Level,
        message: String,
        /// Alarm name, resolved through alarm_oid
        #[arg(long, default_value = "")]
        alarm: String,
    },
    /// Add a signed delta to a KPI
    Kpi {
        name: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Add one to a KPI
    Incr { name: String },
    /// Subtract one from a KPI
    Decr { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_with_config(LogConfig {
        service_name: "telesink-emit".to_string(),
        level: tracing::Level::WARN,
        ..LogConfig::default()
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = SinkConfig::load(&cli.config)
        .with_context(|| format!("Load config {} failed", cli.config.display()))?;
    let channel = config.open_channel().await?;
    let emitter = Emitter::new(channel, Arc::new(config.resolver()), &config.log_path);
    emitter.set_debug(true);
    emitter.set_stdout(cli.stdout);
    emitter.init(&cli.target, &cli.app)?;

    match cli.command {
        Commands::Log {
            level,
            message,
            alarm,
        } => emitter.write_log(level, &alarm, &message).await?,
        Commands::Kpi { name, delta } => emitter.write_kpi(&name, delta).await?,
        Commands::Incr { name } => emitter.increase_kpi(&name).await?,
        Commands::Decr { name } => emitter.decrease_kpi(&name).await?,
    }
    info!("Record sent");
    Ok(())
}
