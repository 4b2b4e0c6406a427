//! Log line multiplexing with daily rotation
//!
//! Log records are written through unchanged to one base path. When the local
//! calendar day changes the file is renamed to `{path}.{YYYYMMDD}` of the day
//! it covered and a new base file is opened on the next write.
//!
//! Records are plain appends without `fsync`, so they stay on the calling
//! task; durable commits go through the blocking pool instead.

use common::time::{format_day, TimeProvider};
use errors::{SinkError, SinkResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telesink_channel::{Bytes, Channel, MessageClass, RecvMode};
use tracing::{error, info};

pub struct LogRotator {
    channel: Arc<dyn Channel>,
    clock: Arc<dyn TimeProvider>,
    path: PathBuf,
    file: Option<File>,
    current_day: String,
}

impl LogRotator {
    pub fn new(channel: Arc<dyn Channel>, clock: Arc<dyn TimeProvider>, path: PathBuf) -> Self {
        let current_day = format_day(clock.now_secs());
        Self {
            channel,
            clock,
            path,
            file: None,
            current_day,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one batch of log records
    ///
    /// Waits up to `wait` for the first record, then takes up to
    /// `max_records - 1` more without waiting. An idle wait returns
    /// [`SinkError::ChannelTimeout`].
    pub async fn process_batch(&mut self, max_records: usize, wait: Duration) -> SinkResult<usize> {
        let first = self
            .channel
            .receive(MessageClass::LogLine, RecvMode::Wait(wait))
            .await?
            .ok_or_else(|| SinkError::ChannelTimeout(MessageClass::LogLine.to_string()))?;
        self.write_record(&first)?;

        let mut written = 1;
        while written < max_records {
            match self
                .channel
                .receive(MessageClass::LogLine, RecvMode::NoWait)
                .await?
            {
                Some(record) => {
                    self.write_record(&record)?;
                    written += 1;
                },
                None => break,
            }
        }
        Ok(written)
    }

    fn write_record(&mut self, record: &Bytes) -> SinkResult<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => Self::open(&self.path)?,
        };
        // a failed handle is dropped and reopened on the next record
        file.write_all(record)?;
        self.file = Some(file);
        Ok(())
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Rotate the base file when the local day has changed
    ///
    /// Returns the archive path when a file was moved aside. The tracked day
    /// only advances once the rename succeeds, so a failed rotation is tried
    /// again on the next call.
    pub fn rotate_if_day_changed(&mut self) -> SinkResult<Option<PathBuf>> {
        let today = format_day(self.clock.now_secs());
        if today == self.current_day {
            return Ok(None);
        }
        self.file = None;

        if !self.path.exists() {
            self.current_day = today;
            return Ok(None);
        }
        let archive = archive_path(&self.path, &self.current_day);
        match fs::rename(&self.path, &archive) {
            Ok(()) => {
                info!("Rotated log to {}", archive.display());
                self.current_day = today;
                Ok(Some(archive))
            },
            Err(e) => {
                error!("Cannot rotate {}: {}", self.path.display(), e);
                Err(SinkError::commit_failed(&archive, e))
            },
        }
    }
}

/// `{path}.{YYYYMMDD}`
pub fn archive_path(path: &Path, day: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(day);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path_appends_day() {
        assert_eq!(
            archive_path(Path::new("/var/log/app.log"), "20240131"),
            PathBuf::from("/var/log/app.log.20240131")
        );
    }
}
