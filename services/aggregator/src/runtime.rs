//! Aggregator task orchestration
//!
//! Starts the KPI, alarm and log loops as independent tokio tasks. Each loop
//! checks its cancellation token between iterations; the log loop's receive
//! is bounded so shutdown is never blocked on an idle channel.

use crate::alarm::AlarmAggregator;
use crate::commit::PublishDir;
use crate::config::SinkConfig;
use crate::kpi::KpiAggregator;
use crate::log_rotator::LogRotator;
use common::time::TimeProvider;
use errors::{SinkError, SinkResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telesink_channel::Channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

/// Loop cadence and batch sizes
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub kpi_poll: Duration,
    pub alarm_poll: Duration,
    pub log_batch: usize,
    pub log_wait: Duration,
    pub error_pause: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            kpi_poll: Duration::from_millis(100),
            alarm_poll: Duration::from_millis(500),
            log_batch: 50,
            log_wait: Duration::from_secs(1),
            error_pause: Duration::from_secs(1),
        }
    }
}

/// The three consumers of one channel
pub struct Aggregators {
    pub kpi: KpiAggregator,
    pub alarm: AlarmAggregator,
    pub rotator: LogRotator,
}

impl Aggregators {
    /// Build every consumer from `config`
    ///
    /// `global_log` is the rotating file that receives log line records.
    pub fn from_config(
        config: &SinkConfig,
        channel: Arc<dyn Channel>,
        clock: Arc<dyn TimeProvider>,
        global_log: PathBuf,
    ) -> SinkResult<Self> {
        let publish = PublishDir::new(&config.alarm_kpi_path, config.resolved_hostname());
        let resolver = config.resolver();
        Ok(Self {
            kpi: KpiAggregator::new(
                channel.clone(),
                clock.clone(),
                &resolver,
                config.kpi_interval,
                publish.clone(),
            )?,
            alarm: AlarmAggregator::new(
                channel.clone(),
                clock.clone(),
                config.alarm_interval,
                publish,
            )?,
            rotator: LogRotator::new(channel, clock, global_log),
        })
    }
}

/// Running aggregator tasks
pub struct AggregatorHandles {
    token: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AggregatorHandles {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel every loop and wait for them to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => debug!("{} task stopped", name),
                Err(e) => error!("{} task failed: {}", name, e),
            }
        }
        info!("Aggregators stopped");
    }
}

/// Spawn the three loops under child tokens of `parent`
pub fn spawn_aggregators(
    aggregators: Aggregators,
    settings: RuntimeSettings,
    parent: &CancellationToken,
) -> AggregatorHandles {
    let Aggregators {
        kpi,
        alarm,
        rotator,
    } = aggregators;
    let token = parent.child_token();
    let tasks = vec![
        (
            "kpi",
            tokio::spawn(run_kpi_loop(kpi, settings.kpi_poll, token.child_token())),
        ),
        (
            "alarm",
            tokio::spawn(run_alarm_loop(
                alarm,
                settings.alarm_poll,
                token.child_token(),
            )),
        ),
        (
            "log",
            tokio::spawn(run_log_loop(rotator, settings, token.child_token())),
        ),
    ];
    info!("Aggregators started");
    AggregatorHandles { token, tasks }
}

/// Sleep for `pause` unless cancelled first; returns false on cancellation
async fn pause_or_cancel(pause: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(pause) => true,
        () = token.cancelled() => false,
    }
}

/// Log `e` at the level its category calls for
fn report(context: &str, e: &SinkError) {
    match e.log_level() {
        Level::ERROR => error!("{} [{}]: {}", context, e.error_code(), e),
        Level::WARN => warn!("{} [{}]: {}", context, e.error_code(), e),
        _ => debug!("{} [{}]: {}", context, e.error_code(), e),
    }
}

/// Run a synchronous flush on the blocking pool
///
/// Commits `fsync` before renaming. The aggregator moves into the blocking
/// task and comes back with the result; `None` means the task panicked.
async fn flush_blocking<A, T>(
    mut aggregator: A,
    flush: fn(&mut A) -> SinkResult<T>,
) -> Option<(A, SinkResult<T>)>
where
    A: Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let result = flush(&mut aggregator);
        (aggregator, result)
    });
    match task.await {
        Ok(done) => Some(done),
        Err(e) => {
            error!("Flush task failed: {}", e);
            None
        },
    }
}

pub async fn run_kpi_loop(mut kpi: KpiAggregator, poll: Duration, token: CancellationToken) {
    info!("KPI loop started");
    loop {
        if let Err(e) = kpi.drain().await {
            report("KPI drain failed", &e);
        }
        if kpi.is_flush_due() {
            let Some((returned, result)) = flush_blocking(kpi, KpiAggregator::flush_if_due).await
            else {
                break;
            };
            kpi = returned;
            if let Err(e) = result {
                report("KPI flush failed", &e);
            }
        }
        if !pause_or_cancel(poll, &token).await {
            break;
        }
    }
    info!("KPI loop stopped");
}

pub async fn run_alarm_loop(mut alarm: AlarmAggregator, poll: Duration, token: CancellationToken) {
    info!("Alarm loop started");
    loop {
        if let Err(e) = alarm.drain().await {
            report("Alarm staging failed", &e);
        }
        if alarm.is_flush_due() {
            let Some((returned, result)) =
                flush_blocking(alarm, AlarmAggregator::flush_if_due).await
            else {
                break;
            };
            alarm = returned;
            if let Err(e) = result {
                report("Alarm promotion failed", &e);
            }
        }
        if !pause_or_cancel(poll, &token).await {
            break;
        }
    }
    info!("Alarm loop stopped");
}

pub async fn run_log_loop(mut rotator: LogRotator, settings: RuntimeSettings, token: CancellationToken) {
    info!("Log loop started: {}", rotator.path().display());
    while !token.is_cancelled() {
        match rotator
            .process_batch(settings.log_batch, settings.log_wait)
            .await
        {
            Ok(_) => {},
            Err(e) if e.is_timeout() => {},
            Err(e) => {
                report("Log batch failed", &e);
                if !pause_or_cancel(settings.error_pause, &token).await {
                    break;
                }
            },
        }
        if let Err(e) = rotator.rotate_if_day_changed() {
            report("Log rotation failed", &e);
        }
    }
    info!("Log loop stopped");
}
