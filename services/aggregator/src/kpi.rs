//! KPI aggregation
//!
//! Sums `{identifier}|{delta}` records per configured identifier and
//! publishes a sorted snapshot on every schedule boundary.

use crate::commit::{commit, ArtifactKind, PublishDir};
use crate::resolver::IdentifierResolver;
use crate::schedule::{FlushSchedule, KPI_WINDOW_SECS};
use common::time::{format_stamp, TimeProvider};
use errors::{SinkError, SinkResult};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use telesink_channel::{Channel, MessageClass, RecvMode};
use tracing::{debug, info, warn};

/// Working file for snapshot commits
pub const KPI_TEMP_FILE: &str = ".kpi.tmp";

/// Producer column of every snapshot line
pub const KPI_SOURCE: &str = "kpi_collector";

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub received: usize,
    pub applied: usize,
    pub dropped: usize,
}

/// Parse a `{identifier}|{signed-integer}` record
pub fn parse_delta(payload: &[u8]) -> SinkResult<(&str, i64)> {
    let malformed = || SinkError::MalformedRecord(String::from_utf8_lossy(payload).into_owned());

    let line = std::str::from_utf8(payload).map_err(|_| malformed())?;
    let mut fields = line.split('|');
    let (Some(identifier), Some(delta), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    let delta = delta.trim().parse::<i64>().map_err(|_| malformed())?;
    Ok((identifier, delta))
}

pub struct KpiAggregator {
    channel: Arc<dyn Channel>,
    clock: Arc<dyn TimeProvider>,
    identifiers: BTreeSet<String>,
    counters: BTreeMap<String, i64>,
    schedule: FlushSchedule,
    publish: PublishDir,
}

impl KpiAggregator {
    pub fn new(
        channel: Arc<dyn Channel>,
        clock: Arc<dyn TimeProvider>,
        resolver: &IdentifierResolver,
        interval_secs: i64,
        publish: PublishDir,
    ) -> SinkResult<Self> {
        let schedule = FlushSchedule::new(interval_secs, KPI_WINDOW_SECS)?;
        let identifiers = resolver.metric_identifiers();
        if identifiers.is_empty() {
            warn!("No KPI identifiers configured, snapshots will be empty");
        }
        let mut aggregator = Self {
            channel,
            clock,
            identifiers,
            counters: BTreeMap::new(),
            schedule,
            publish,
        };
        aggregator.reset();
        Ok(aggregator)
    }

    /// Zero every counter, keyed by exactly the configured identifier set
    pub fn reset(&mut self) {
        self.counters = self
            .identifiers
            .iter()
            .map(|id| (id.clone(), 0))
            .collect();
    }

    /// Add `delta` to a configured identifier
    ///
    /// A delta that would overflow the counter is rejected and the counter is
    /// left unchanged.
    pub fn apply(&mut self, identifier: &str, delta: i64) -> SinkResult<()> {
        match self.counters.get_mut(identifier) {
            Some(value) => {
                *value = value
                    .checked_add(delta)
                    .ok_or_else(|| SinkError::CounterOverflow {
                        identifier: identifier.to_string(),
                        delta,
                    })?;
                Ok(())
            },
            None => Err(SinkError::UnknownIdentifier {
                identifier: identifier.to_string(),
                delta,
            }),
        }
    }

    /// Receive metric records until the channel is empty
    ///
    /// Malformed records and unknown identifiers are dropped with a warning.
    pub async fn drain(&mut self) -> SinkResult<DrainStats> {
        let mut stats = DrainStats::default();
        while let Some(payload) = self
            .channel
            .receive(MessageClass::Metric, RecvMode::NoWait)
            .await?
        {
            stats.received += 1;
            let applied = parse_delta(&payload)
                .and_then(|(identifier, delta)| self.apply(identifier, delta));
            match applied {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    warn!("Dropping KPI record: {}", e);
                    stats.dropped += 1;
                },
            }
        }
        if stats.received > 0 {
            debug!(
                "KPI drain: {} received, {} applied, {} dropped",
                stats.received, stats.applied, stats.dropped
            );
        }
        Ok(stats)
    }

    /// Whether the next `flush_if_due` call would act
    pub fn is_flush_due(&self) -> bool {
        self.schedule.is_due(self.clock.now_secs())
    }

    /// Publish a snapshot if the schedule says so
    ///
    /// The cursor moves before anything is written, so a failed write is not
    /// retried until the next boundary; the counters are kept in that case.
    pub fn flush_if_due(&mut self) -> SinkResult<Option<PathBuf>> {
        let now = self.clock.now_secs();
        if !self.schedule.is_due(now) {
            return Ok(None);
        }
        self.schedule.mark(now);

        let stamp = format_stamp(now);
        let temp = self.publish.work_path(KPI_TEMP_FILE);
        let target = self.publish.artifact_path(ArtifactKind::Kpi, now);
        let counters = &self.counters;
        commit(&temp, &target, |w| {
            for (identifier, value) in counters {
                writeln!(w, "{}|{}|KPI|{}|{}", stamp, KPI_SOURCE, identifier, value)?;
            }
            Ok(())
        })?;

        info!("Flush KPI file [{}]", target.display());
        self.reset();
        Ok(Some(target))
    }

    pub fn value(&self, identifier: &str) -> Option<i64> {
        self.counters.get(identifier).copied()
    }

    /// Current counters in identifier order
    pub fn snapshot(&self) -> &BTreeMap<String, i64> {
        &self.counters
    }

    pub fn last_flush(&self) -> i64 {
        self.schedule.last_flush()
    }
}
