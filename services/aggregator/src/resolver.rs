//! Identifier resolution
//!
//! Maps logical metric and alarm names to the external identifiers written
//! into published files.

use errors::{SinkError, SinkResult};
use std::collections::{BTreeMap, BTreeSet};

/// Alarm table key consulted when a name has no entry of its own
pub const ALARM_WILDCARD: &str = "*";

/// Alarm name meaning "log only, raise nothing"
pub const NO_ALARM: &str = "";

#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    metrics: BTreeMap<String, String>,
    alarms: BTreeMap<String, String>,
}

impl IdentifierResolver {
    pub fn new(metrics: BTreeMap<String, String>, alarms: BTreeMap<String, String>) -> Self {
        Self { metrics, alarms }
    }

    /// Resolve a metric name; there is no fallback
    pub fn lookup_metric(&self, name: &str) -> SinkResult<&str> {
        self.metrics
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SinkError::UnknownMetric(name.to_string()))
    }

    /// Resolve an alarm name, falling back to the wildcard entry
    ///
    /// [`NO_ALARM`] resolves to an empty identifier.
    pub fn lookup_alarm(&self, name: &str) -> SinkResult<&str> {
        if name == NO_ALARM {
            return Ok(NO_ALARM);
        }
        self.alarms
            .get(name)
            .or_else(|| self.alarms.get(ALARM_WILDCARD))
            .map(String::as_str)
            .ok_or_else(|| SinkError::UnknownAlarm(name.to_string()))
    }

    /// Every configured metric identifier, deduplicated and sorted
    pub fn metric_identifiers(&self) -> BTreeSet<String> {
        self.metrics.values().cloned().collect()
    }
}
