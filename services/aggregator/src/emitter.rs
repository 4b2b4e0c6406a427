//! Producer-side emitter
//!
//! Applications format log lines, alarm events and KPI deltas through an
//! [`Emitter`] and hand them to the channel. Identity and flags sit behind a
//! single lock; file appends happen under it, channel sends after it is
//! released.

use crate::config::validate_file;
use crate::resolver::{IdentifierResolver, NO_ALARM};
use common::time::{format_log_stamp, format_stamp, SystemTimeProvider, TimeProvider};
use errors::{SinkError, SinkResult};
use parking_lot::Mutex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use telesink_channel::{Bytes, Channel, MessageClass};
use tracing::{debug, warn};

/// Log target meaning "send lines through the channel"
pub const CHANNEL_TARGET: &str = "mq";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Clean,
    Event,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Clean => "CLEAN",
            Self::Event => "EVENT",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Levels above Info may raise an alarm
    pub fn raises_alarm(self) -> bool {
        self > Self::Info
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "CLEAN" => Ok(Self::Clean),
            "EVENT" => Ok(Self::Event),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            _ => Err(SinkError::InvalidArgument(format!("Unknown level: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    File(PathBuf),
    Channel,
}

#[derive(Debug, Default)]
struct EmitterState {
    target: Option<LogTarget>,
    app_name: String,
    debug: bool,
    stdout: bool,
}

pub struct Emitter {
    channel: Arc<dyn Channel>,
    resolver: Arc<IdentifierResolver>,
    clock: Arc<dyn TimeProvider>,
    log_dir: PathBuf,
    state: Mutex<EmitterState>,
}

impl Emitter {
    pub fn new(
        channel: Arc<dyn Channel>,
        resolver: Arc<IdentifierResolver>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_clock(channel, resolver, log_dir, Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(
        channel: Arc<dyn Channel>,
        resolver: Arc<IdentifierResolver>,
        log_dir: impl Into<PathBuf>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            channel,
            resolver,
            clock,
            log_dir: log_dir.into(),
            state: Mutex::new(EmitterState::default()),
        }
    }

    /// Bind the emitter to a log target and application name
    ///
    /// `target` is a file name under the log directory, or `"mq"` to send
    /// log lines through the channel.
    pub fn init(&self, target: &str, app_name: &str) -> SinkResult<()> {
        if target.is_empty() || app_name.is_empty() || self.log_dir.as_os_str().is_empty() {
            return Err(SinkError::InvalidArgument(format!(
                "path[{}] target[{}] app_name[{}]",
                self.log_dir.display(),
                target,
                app_name
            )));
        }
        let target = if target.eq_ignore_ascii_case(CHANNEL_TARGET) {
            LogTarget::Channel
        } else {
            let path = self.log_dir.join(target);
            validate_file(&path)?;
            LogTarget::File(path)
        };

        let mut state = self.state.lock();
        state.target = Some(target);
        state.app_name = app_name.to_string();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().target.is_some()
    }

    pub fn set_debug(&self, debug: bool) {
        self.state.lock().debug = debug;
    }

    pub fn set_stdout(&self, stdout: bool) {
        self.state.lock().stdout = stdout;
    }

    pub fn dump(&self) -> String {
        let state = self.state.lock();
        let target = match &state.target {
            Some(LogTarget::File(path)) => path.display().to_string(),
            Some(LogTarget::Channel) => CHANNEL_TARGET.to_string(),
            None => "-".to_string(),
        };
        format!(
            "LogPath: {}\nTarget: {}\nAppName: {}\nDebug: {}\nStdout: {}\n",
            self.log_dir.display(),
            target,
            state.app_name,
            state.debug,
            state.stdout
        )
    }

    /// Write a log line and, for levels above Info, raise `alarm_name`
    ///
    /// An uninitialised emitter only echoes to stdout. An alarm name that
    /// resolves to nothing is logged and skipped.
    pub async fn write_log(&self, level: Level, alarm_name: &str, message: &str) -> SinkResult<()> {
        let now_ms = self.clock.now_millis();
        let (channel_line, app_name) = {
            let state = self.state.lock();
            if level == Level::Debug && !state.debug {
                return Ok(());
            }
            let line = format!(
                "{}|{}|{}|{}",
                format_log_stamp(now_ms),
                state.app_name,
                level,
                message
            );
            if state.stdout || state.target.is_none() {
                println!("{}", line);
            }
            let framed = format!("{}\n", line);
            match &state.target {
                None => return Ok(()),
                // one write per line, under the lock
                Some(LogTarget::File(path)) => {
                    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                    file.write_all(framed.as_bytes())?;
                    (None, state.app_name.clone())
                },
                Some(LogTarget::Channel) => (Some(framed), state.app_name.clone()),
            }
        };

        if let Some(framed) = channel_line {
            self.channel
                .send(MessageClass::LogLine, Bytes::from(framed))
                .await?;
        }

        if !level.raises_alarm() {
            return Ok(());
        }
        let oid = match self.resolver.lookup_alarm(alarm_name) {
            Ok(oid) if oid != NO_ALARM => oid,
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!("Alarm skipped: {}", e);
                return Ok(());
            },
        };
        let alarm = format!(
            "{}|{}|{}|.{}|{}",
            format_stamp(now_ms.div_euclid(1000)),
            app_name,
            level,
            oid,
            message
        );
        debug!("Raising alarm {}", alarm);
        self.channel
            .send(MessageClass::Alarm, Bytes::from(alarm))
            .await?;
        Ok(())
    }

    pub async fn debug(&self, message: &str) -> SinkResult<()> {
        self.write_log(Level::Debug, NO_ALARM, message).await
    }

    pub async fn info(&self, message: &str) -> SinkResult<()> {
        self.write_log(Level::Info, NO_ALARM, message).await
    }

    /// Send a KPI delta for metric `name`
    pub async fn write_kpi(&self, name: &str, delta: i64) -> SinkResult<()> {
        if !self.is_initialized() {
            return Err(SinkError::NotInitialized("emitter".to_string()));
        }
        let oid = self.resolver.lookup_metric(name)?;
        self.channel
            .send(MessageClass::Metric, Bytes::from(format!("{}|{}", oid, delta)))
            .await?;
        Ok(())
    }

    pub async fn increase_kpi(&self, name: &str) -> SinkResult<()> {
        self.write_kpi(name, 1).await
    }

    pub async fn decrease_kpi(&self, name: &str) -> SinkResult<()> {
        self.write_kpi(name, -1).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_level_order_and_names() {
        assert!(Level::Clean > Level::Info);
        assert!(!Level::Info.raises_alarm());
        assert!(Level::Clean.raises_alarm());
        assert_eq!(Level::Fatal.to_string(), "FATAL");
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warn);
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_dump_reports_binding() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Emitter::new(
            Arc::new(telesink_channel::MemoryChannel::new()),
            Arc::new(IdentifierResolver::default()),
            dir.path(),
        );
        assert!(emitter.dump().contains("Target: -\n"));

        emitter.init("MQ", "billing").unwrap();
        emitter.set_debug(true);
        let dump = emitter.dump();
        assert!(dump.contains("Target: mq\n"));
        assert!(dump.contains("AppName: billing\n"));
        assert!(dump.contains("Debug: true\n"));
    }
}
