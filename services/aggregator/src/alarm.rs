//! Alarm aggregation
//!
//! Alarm records are appended to a staging file as soon as they are drained.
//! On each schedule boundary a non-empty staging file is promoted to a
//! published `WARNING` file; the next append starts a fresh staging file.

use crate::commit::{promote, ArtifactKind, PublishDir};
use crate::schedule::{FlushSchedule, ALARM_WINDOW_SECS};
use common::time::TimeProvider;
use errors::SinkResult;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telesink_channel::{Bytes, Channel, MessageClass, RecvMode};
use tracing::{debug, info, warn};

/// Staging file for drained alarm records
pub const ALARM_STAGING_FILE: &str = ".alarm.tmp";

/// Tracked state of the staging file
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    len: u64,
}

impl StagingFile {
    /// Pick up whatever a previous run left at `path`
    pub fn open_existing(path: PathBuf) -> SinkResult<Self> {
        let len = disk_len(&path)?;
        if len > 0 {
            info!(
                "Found {} staged alarm bytes in {}",
                len,
                path.display()
            );
        }
        Ok(Self { path, len })
    }

    /// Append each record followed by a newline
    pub fn append(&mut self, records: &[Bytes]) -> SinkResult<()> {
        self.write_with(|writer| {
            for record in records {
                writer.write_all(record)?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })
    }

    /// Run `write` against the staging file opened for append
    ///
    /// The tracked length is re-read from disk afterwards, including on
    /// failure, when part of the batch may already be in the file.
    fn write_with<F>(&mut self, write: F) -> SinkResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    {
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                write(&mut writer)?;
                writer.flush()
            });
        if let Err(e) = written {
            match disk_len(&self.path) {
                Ok(len) => self.len = len,
                Err(stat) => warn!("Cannot stat {}: {}", self.path.display(), stat),
            }
            return Err(e.into());
        }
        self.len = disk_len(&self.path)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the staged content to `target`; the staging path is then free
    pub fn promote_to(&mut self, target: &Path) -> SinkResult<()> {
        promote(&self.path, target)?;
        self.len = 0;
        Ok(())
    }
}

/// Size of a regular file at `path`, zero when absent
fn disk_len(path: &Path) -> io::Result<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(io::Error::other(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

pub struct AlarmAggregator {
    channel: Arc<dyn Channel>,
    clock: Arc<dyn TimeProvider>,
    schedule: FlushSchedule,
    publish: PublishDir,
    staging: StagingFile,
}

impl AlarmAggregator {
    pub fn new(
        channel: Arc<dyn Channel>,
        clock: Arc<dyn TimeProvider>,
        interval_secs: i64,
        publish: PublishDir,
    ) -> SinkResult<Self> {
        let schedule = FlushSchedule::new(interval_secs, ALARM_WINDOW_SECS)?;
        let staging = StagingFile::open_existing(publish.work_path(ALARM_STAGING_FILE))?;
        Ok(Self {
            channel,
            clock,
            schedule,
            publish,
            staging,
        })
    }

    /// Receive alarm records until the channel is empty and stage them
    ///
    /// Returns the number of records staged.
    pub async fn drain(&mut self) -> SinkResult<usize> {
        let mut records = Vec::new();
        while let Some(payload) = self
            .channel
            .receive(MessageClass::Alarm, RecvMode::NoWait)
            .await?
        {
            records.push(payload);
        }
        if records.is_empty() {
            return Ok(0);
        }
        self.staging.append(&records)?;
        debug!("Staged {} alarm records", records.len());
        Ok(records.len())
    }

    /// Whether the next `flush_if_due` call would act
    pub fn is_flush_due(&self) -> bool {
        self.schedule.is_due(self.clock.now_secs())
    }

    /// Promote the staging file if the schedule says so
    ///
    /// An empty staging file only advances the cursor.
    pub fn flush_if_due(&mut self) -> SinkResult<Option<PathBuf>> {
        let now = self.clock.now_secs();
        if !self.schedule.is_due(now) {
            return Ok(None);
        }
        self.schedule.mark(now);

        if self.staging.is_empty() {
            return Ok(None);
        }
        let target = self.publish.artifact_path(ArtifactKind::Warning, now);
        self.staging.promote_to(&target)?;
        info!("Write WARNING file [{}]", target.display());
        Ok(Some(target))
    }

    pub fn staging(&self) -> &StagingFile {
        &self.staging
    }

    pub fn last_flush(&self) -> i64 {
        self.schedule.last_flush()
    }
}
