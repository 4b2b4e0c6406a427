//! Window-aligned flush scheduling
//!
//! A flush is due once the interval has elapsed since the last flush *and*
//! the clock sits inside a short window after an interval boundary. Pollers
//! must tick faster than the window width or a boundary can be missed.

use errors::{SinkError, SinkResult};

/// Alignment window of the KPI snapshot flush
pub const KPI_WINDOW_SECS: i64 = 2;

/// Alignment window of the alarm promotion
pub const ALARM_WINDOW_SECS: i64 = 3;

/// Whether a flush is due at `now`
///
/// A non-positive interval is never due.
pub fn is_due(now: i64, last_flush: i64, interval: i64, window: i64) -> bool {
    if interval <= 0 {
        return false;
    }
    now - last_flush >= interval && now.rem_euclid(interval) < window
}

/// Flush cursor plus the policy parameters of one aggregator
#[derive(Debug, Clone)]
pub struct FlushSchedule {
    interval: i64,
    window: i64,
    last_flush: i64,
}

impl FlushSchedule {
    pub fn new(interval: i64, window: i64) -> SinkResult<Self> {
        if interval <= 0 {
            return Err(SinkError::invalid_config(
                "interval",
                format!("must be positive, got {}", interval),
            ));
        }
        if window <= 0 {
            return Err(SinkError::invalid_config(
                "window",
                format!("must be positive, got {}", window),
            ));
        }
        Ok(Self {
            interval,
            window,
            last_flush: 0,
        })
    }

    pub fn is_due(&self, now: i64) -> bool {
        is_due(now, self.last_flush, self.interval, self.window)
    }

    /// Move the cursor; called before the flush writes anything
    pub fn mark(&mut self, now: i64) {
        self.last_flush = now;
    }

    pub fn last_flush(&self) -> i64 {
        self.last_flush
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_interval_never_due() {
        assert!(!is_due(1_000, 0, 0, 2));
        assert!(!is_due(1_000, 0, -5, 2));
    }

    #[test]
    fn test_due_inside_window_only() {
        // 600 is a boundary of interval 300
        assert!(is_due(600, 0, 300, 2));
        assert!(is_due(601, 0, 300, 2));
        assert!(!is_due(602, 0, 300, 2));
        assert!(is_due(602, 0, 300, 3));
    }

    #[test]
    fn test_not_due_before_interval_elapsed() {
        assert!(!is_due(600, 450, 300, 2));
        assert!(is_due(900, 600, 300, 2));
    }

    #[test]
    fn test_schedule_rejects_bad_interval() {
        assert!(matches!(
            FlushSchedule::new(0, 2),
            Err(SinkError::InvalidConfig { .. })
        ));
        assert!(FlushSchedule::new(300, 0).is_err());
    }

    #[test]
    fn test_mark_suppresses_repeat_in_window() {
        let mut schedule = FlushSchedule::new(300, 2).unwrap();
        assert_eq!(schedule.last_flush(), 0);
        assert!(schedule.is_due(600));
        schedule.mark(600);
        assert!(!schedule.is_due(600));
        assert!(!schedule.is_due(601));
        assert!(schedule.is_due(900));
    }
}
