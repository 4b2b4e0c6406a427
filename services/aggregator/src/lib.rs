//! Telesink aggregator
//!
//! Drains the shared record channel and materializes its three classes:
//!
//! - **KPI**: metric deltas summed per identifier, snapshot on a fixed interval
//! - **Alarm**: alarm lines staged immediately, published in timed batches
//! - **Log**: log lines written through to a daily rotating file
//!
//! Published files become visible atomically through [`commit`]. At most one
//! aggregator may consume a given channel and output directory.

pub mod alarm;
pub mod commit;
pub mod config;
pub mod emitter;
pub mod kpi;
pub mod log_rotator;
pub mod resolver;
pub mod runtime;
pub mod schedule;

pub use alarm::{AlarmAggregator, StagingFile};
pub use commit::{artifact_name, commit, promote, ArtifactKind, PublishDir};
pub use config::{validate_dir, validate_file, ChannelBackend, SinkConfig};
pub use emitter::{Emitter, Level};
pub use kpi::{DrainStats, KpiAggregator};
pub use log_rotator::LogRotator;
pub use resolver::IdentifierResolver;
pub use runtime::{spawn_aggregators, AggregatorHandles, Aggregators, RuntimeSettings};
pub use schedule::{is_due, FlushSchedule};
