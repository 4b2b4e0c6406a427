//! Time provider abstraction
//!
//! Flush scheduling and file naming read the clock through [`TimeProvider`]
//! so tests can pin or step time deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone};

/// Seconds-resolution timestamp used in published file names and KPI lines
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Day-resolution format used for rotated log suffixes
pub const DAY_FORMAT: &str = "%Y%m%d";

/// Time provider trait for generating timestamps
pub trait TimeProvider: Send + Sync + 'static {
    /// Get current timestamp in milliseconds since Unix epoch
    fn now_millis(&self) -> i64;

    /// Get current timestamp in whole seconds since Unix epoch
    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// System time provider using the local clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// Manually driven time provider for tests
///
/// Starts at a fixed timestamp and only moves when told to.
#[derive(Debug)]
pub struct ManualTimeProvider {
    timestamp_ms: AtomicI64,
}

impl ManualTimeProvider {
    /// Create a provider pinned to `secs` seconds since the epoch
    pub fn at_secs(secs: i64) -> Self {
        Self {
            timestamp_ms: AtomicI64::new(secs * 1000),
        }
    }

    /// Jump to an absolute time in seconds
    pub fn set_secs(&self, secs: i64) {
        self.timestamp_ms.store(secs * 1000, Ordering::SeqCst);
    }

    /// Move forward by `millis`
    pub fn advance_millis(&self, millis: i64) {
        self.timestamp_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_millis(&self) -> i64 {
        self.timestamp_ms.load(Ordering::SeqCst)
    }
}

/// Convert epoch seconds to host-local time
///
/// Out-of-range values clamp to the epoch.
pub fn local_from_secs(secs: i64) -> DateTime<Local> {
    Local
        .timestamp_opt(secs, 0)
        .earliest()
        .unwrap_or_else(|| DateTime::<Local>::from(UNIX_EPOCH))
}

/// Format epoch seconds as `YYYYMMDDHHMMSS` in host-local time
pub fn format_stamp(secs: i64) -> String {
    local_from_secs(secs).format(STAMP_FORMAT).to_string()
}

/// Format epoch seconds as `YYYYMMDD` in host-local time
pub fn format_day(secs: i64) -> String {
    local_from_secs(secs).format(DAY_FORMAT).to_string()
}

/// Format epoch millis as `YYYYMMDD-HHMMSS.mmm` in host-local time
pub fn format_log_stamp(millis: i64) -> String {
    let secs = millis.div_euclid(1000);
    let ms = millis.rem_euclid(1000);
    format!(
        "{}.{:03}",
        local_from_secs(secs).format("%Y%m%d-%H%M%S"),
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_provider() {
        let provider = SystemTimeProvider;
        let time1 = provider.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let time2 = provider.now_millis();

        assert!(time2 >= time1);
        assert!(time2 - time1 >= 10);
        assert_eq!(provider.now_secs(), provider.now_millis() / 1000);
    }

    #[test]
    fn test_manual_time_provider() {
        let provider = ManualTimeProvider::at_secs(1_700_000_000);
        assert_eq!(provider.now_secs(), 1_700_000_000);

        provider.advance_millis(1_500);
        assert_eq!(provider.now_millis(), 1_700_000_001_500);
        assert_eq!(provider.now_secs(), 1_700_000_001);

        provider.set_secs(42);
        assert_eq!(provider.now_secs(), 42);
    }

    #[test]
    fn test_stamp_formats_are_fixed_width() {
        let secs = 1_700_000_000;
        let local = local_from_secs(secs);

        assert_eq!(format_stamp(secs).len(), 14);
        assert_eq!(format_stamp(secs), local.format("%Y%m%d%H%M%S").to_string());
        assert_eq!(format_day(secs), local.format("%Y%m%d").to_string());

        let log_stamp = format_log_stamp(secs * 1000 + 7);
        assert_eq!(log_stamp.len(), 19);
        assert!(log_stamp.ends_with(".007"));
    }
}
