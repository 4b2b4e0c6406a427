//! Sink configuration
//!
//! Loaded from JSON, TOML or YAML (chosen by file extension) with
//! `TELESINK_`-prefixed environment variables layered on top.

use crate::commit::commit;
use crate::resolver::IdentifierResolver;
use errors::{SinkError, SinkResult};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telesink_channel::{Channel, MemoryChannel, RedisChannel, DEFAULT_MAX_MESSAGE_SIZE};
use tracing::{debug, info, warn};

pub const DEFAULT_MQ_ID: i64 = telesink_channel::DEFAULT_QUEUE_ID;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// KPI intervals at or below this are replaced by [`DEFAULT_KPI_INTERVAL`]
pub const MIN_KPI_INTERVAL: i64 = 60;
pub const DEFAULT_KPI_INTERVAL: i64 = 300;

/// Accepted alarm interval range, seconds
pub const ALARM_INTERVAL_RANGE: std::ops::RangeInclusive<i64> = 2..=59;
pub const DEFAULT_ALARM_INTERVAL: i64 = 5;

/// Prefix of environment overrides, e.g. `TELESINK_KPI_INTERVAL=600`
pub const ENV_PREFIX: &str = "TELESINK_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Channel namespace id
    pub mq_id: i64,
    pub channel_backend: ChannelBackend,
    pub redis_url: String,
    /// Longer records are truncated on receive
    pub max_message_size: usize,
    /// Directory of application and rotating logs
    pub log_path: PathBuf,
    /// Directory of published KPI and WARNING files
    pub alarm_kpi_path: PathBuf,
    /// Seconds between KPI snapshots
    pub kpi_interval: i64,
    /// Seconds between alarm promotions
    pub alarm_interval: i64,
    /// Alarm name -> identifier, `"*"` is the fallback
    pub alarm_oid: BTreeMap<String, String>,
    /// Metric name -> identifier
    pub kpi_oid: BTreeMap<String, String>,
    /// Overrides the OS host name in published file names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mq_id: DEFAULT_MQ_ID,
            channel_backend: ChannelBackend::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            log_path: PathBuf::new(),
            alarm_kpi_path: PathBuf::new(),
            kpi_interval: DEFAULT_KPI_INTERVAL,
            alarm_interval: DEFAULT_ALARM_INTERVAL,
            alarm_oid: BTreeMap::new(),
            kpi_oid: BTreeMap::new(),
            hostname: None,
        }
    }
}

impl SinkConfig {
    /// Parse `path` plus environment overrides and apply interval floors
    ///
    /// Directories are not checked; see [`SinkConfig::load`].
    pub fn from_file(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SinkError::config(format!("No file extension: {}", path.display())))?;

        let figment = match extension {
            "json" => Figment::new().merge(Json::file(path)),
            "toml" => Figment::new().merge(Toml::file(path)),
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            _ => {
                return Err(SinkError::config(format!(
                    "Unsupported config format: {}",
                    extension
                )))
            },
        };
        if !path.is_file() {
            return Err(SinkError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let mut config: SinkConfig = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| SinkError::config(format!("Failed to parse config: {}", e)))?;
        config.apply_defaults();
        debug!("Config parsed from {}", path.display());
        Ok(config)
    }

    /// Parse, apply floors and validate
    pub fn load(path: impl AsRef<Path>) -> SinkResult<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace out-of-range values with their defaults
    pub fn apply_defaults(&mut self) {
        if self.mq_id <= 0 {
            self.mq_id = DEFAULT_MQ_ID;
        }
        if self.kpi_interval <= MIN_KPI_INTERVAL {
            warn!(
                "kpi_interval {} too small, using {}",
                self.kpi_interval, DEFAULT_KPI_INTERVAL
            );
            self.kpi_interval = DEFAULT_KPI_INTERVAL;
        }
        if !ALARM_INTERVAL_RANGE.contains(&self.alarm_interval) {
            warn!(
                "alarm_interval {} out of range, using {}",
                self.alarm_interval, DEFAULT_ALARM_INTERVAL
            );
            self.alarm_interval = DEFAULT_ALARM_INTERVAL;
        }
        if self.max_message_size == 0 {
            self.max_message_size = DEFAULT_MAX_MESSAGE_SIZE;
        }
    }

    pub fn validate(&self) -> SinkResult<()> {
        if self.kpi_interval <= 0 {
            return Err(SinkError::invalid_config("kpi_interval", "must be positive"));
        }
        if self.alarm_interval <= 0 {
            return Err(SinkError::invalid_config("alarm_interval", "must be positive"));
        }
        if self.channel_backend == ChannelBackend::Redis && self.redis_url.trim().is_empty() {
            return Err(SinkError::invalid_config(
                "redis_url",
                "required for the redis backend",
            ));
        }
        if self.kpi_oid.values().any(|id| id.is_empty() || id.contains('|')) {
            return Err(SinkError::invalid_config(
                "kpi_oid",
                "identifiers must be non-empty and free of '|'",
            ));
        }
        validate_dir(&self.log_path)?;
        validate_dir(&self.alarm_kpi_path)?;
        Ok(())
    }

    /// Write as pretty JSON through a temporary file
    pub fn save(&self, path: impl AsRef<Path>) -> SinkResult<()> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SinkError::InvalidArgument(format!("Not a file: {}", path.display())))?;
        let temp = path.with_file_name(format!(".{}.tmp", file_name));
        commit(&temp, path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            Ok(())
        })?;
        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Human readable summary
    pub fn dump(&self) -> String {
        format!(
            "mq_id[{}]\nchannel_backend[{:?}]\nlog_path[{}]\nalarm_kpi_path[{}]\nkpi_interval[{}]\nalarm_interval[{}]\nalarm_oid[{:?}]\nkpi_oid[{:?}]\n",
            self.mq_id,
            self.channel_backend,
            self.log_path.display(),
            self.alarm_kpi_path.display(),
            self.kpi_interval,
            self.alarm_interval,
            self.alarm_oid,
            self.kpi_oid
        )
    }

    pub fn resolver(&self) -> IdentifierResolver {
        IdentifierResolver::new(self.kpi_oid.clone(), self.alarm_oid.clone())
    }

    pub fn resolved_hostname(&self) -> String {
        common::resolve_hostname(self.hostname.as_deref())
    }

    /// Connect the configured channel backend
    pub async fn open_channel(&self) -> SinkResult<Arc<dyn Channel>> {
        match self.channel_backend {
            ChannelBackend::Redis => {
                let channel =
                    RedisChannel::new(&self.redis_url, self.mq_id, self.max_message_size).await?;
                info!("Channel {} on {}", self.mq_id, self.redis_url);
                Ok(Arc::new(channel))
            },
            ChannelBackend::Memory => {
                warn!("Memory channel only carries records produced inside this process");
                Ok(Arc::new(MemoryChannel::with_max_message_size(
                    self.max_message_size,
                )))
            },
        }
    }
}

/// Check that `dir` exists, is a directory and accepts new files
pub fn validate_dir(dir: &Path) -> SinkResult<()> {
    let meta = fs::metadata(dir).map_err(|e| {
        SinkError::invalid_config(dir.display().to_string(), format!("cannot open: {}", e))
    })?;
    if !meta.is_dir() {
        return Err(SinkError::invalid_config(
            dir.display().to_string(),
            "not a directory",
        ));
    }

    let marker = dir.join(format!(".{}.test", std::process::id()));
    fs::File::create(&marker).map_err(|e| {
        SinkError::invalid_config(dir.display().to_string(), format!("not writable: {}", e))
    })?;
    if let Err(e) = fs::remove_file(&marker) {
        warn!("Cannot remove write check {}: {}", marker.display(), e);
    }
    Ok(())
}

/// Check that `path` can be opened for appending, creating it if needed
pub fn validate_file(path: &Path) -> SinkResult<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| {
            SinkError::invalid_config(path.display().to_string(), format!("not writable: {}", e))
        })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn json_config(dir: &Path, kpi_interval: i64, alarm_interval: i64) -> String {
        format!(
            r#"{{
                "mq_id": 0,
                "log_path": "{dir}",
                "alarm_kpi_path": "{dir}",
                "kpi_interval": {kpi_interval},
                "alarm_interval": {alarm_interval},
                "alarm_oid": {{ "DB_DOWN": "1.3.6.1.4.1.193.176.3.4.2", "*": "1.3.1.1.99999999" }},
                "kpi_oid": {{ "REQ": "REQ_COUNT", "RES": "RES_COUNT" }}
            }}"#,
            dir = dir.display()
        )
    }

    #[test]
    fn test_load_json_applies_floors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "sink.json", &json_config(dir.path(), 30, 60));

        let config = SinkConfig::load(&path).unwrap();
        assert_eq!(config.mq_id, DEFAULT_MQ_ID);
        assert_eq!(config.kpi_interval, DEFAULT_KPI_INTERVAL);
        assert_eq!(config.alarm_interval, DEFAULT_ALARM_INTERVAL);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.channel_backend, ChannelBackend::Redis);
        assert_eq!(config.kpi_oid.len(), 2);
    }

    #[test]
    fn test_intervals_in_range_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "sink.json", &json_config(dir.path(), 61, 2));

        let config = SinkConfig::load(&path).unwrap();
        assert_eq!(config.kpi_interval, 61);
        assert_eq!(config.alarm_interval, 2);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "log_path: {dir}\nalarm_kpi_path: {dir}\nchannel_backend: memory\nkpi_interval: 120\nkpi_oid:\n  REQ: REQ_COUNT\n",
            dir = dir.path().display()
        );
        let path = write_config(dir.path(), "sink.yaml", &body);

        let config = SinkConfig::load(&path).unwrap();
        assert_eq!(config.channel_backend, ChannelBackend::Memory);
        assert_eq!(config.kpi_interval, 120);
        assert_eq!(config.resolver().lookup_metric("REQ").unwrap(), "REQ_COUNT");
    }

    #[test]
    fn test_missing_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let body = format!(
            r#"{{ "log_path": "{}", "alarm_kpi_path": "{}" }}"#,
            missing.display(),
            dir.path().display()
        );
        let path = write_config(dir.path(), "sink.json", &body);

        assert!(matches!(
            SinkConfig::load(&path),
            Err(SinkError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "sink.ini", "x=1");
        assert!(matches!(
            SinkConfig::from_file(&path),
            Err(SinkError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SinkConfig::from_file(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "sink.json", &json_config(dir.path(), 600, 10));
        let config = SinkConfig::load(&path).unwrap();

        let saved = dir.path().join("saved.json");
        config.save(&saved).unwrap();
        assert!(!dir.path().join(".saved.json.tmp").exists());

        let reloaded = SinkConfig::load(&saved).unwrap();
        assert_eq!(reloaded.kpi_interval, 600);
        assert_eq!(reloaded.alarm_oid, config.alarm_oid);
    }

    #[test]
    fn test_validate_dir_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "plain", "");
        assert!(validate_dir(&file).is_err());
        assert!(validate_dir(dir.path()).is_ok());
        assert!(!dir
            .path()
            .join(format!(".{}.test", std::process::id()))
            .exists());
    }

    #[test]
    fn test_validate_file_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        validate_file(&path).unwrap();
        assert!(path.exists());
        assert!(validate_file(&dir.path().join("no/such/dir/app.log")).is_err());
    }

    #[test]
    fn test_dump_lists_fields() {
        let config = SinkConfig::default();
        let dump = config.dump();
        assert!(dump.starts_with("mq_id[7888]\n"));
        assert!(dump.contains("kpi_interval[300]"));
    }
}
