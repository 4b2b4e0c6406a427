//! Durable commit of published files
//!
//! Content is written under a temporary name in the destination directory and
//! renamed into place. The rename is the visibility boundary: a reader of the
//! directory sees either no file or the complete file. The primitive does no
//! locking; one writer per temporary path is the caller's job.

use common::time::format_stamp;
use errors::{SinkError, SinkResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Kind segment of a published file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Kpi,
    Warning,
}

impl ArtifactKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kpi => "KPI",
            Self::Warning => "WARNING",
        }
    }
}

/// `{host}-{KIND}-{YYYYMMDDHHMMSS}.txt`
pub fn artifact_name(hostname: &str, kind: ArtifactKind, now_secs: i64) -> String {
    format!("{}-{}-{}.txt", hostname, kind.as_str(), format_stamp(now_secs))
}

/// Output directory plus the host prefix of every file published into it
#[derive(Debug, Clone)]
pub struct PublishDir {
    dir: PathBuf,
    hostname: String,
}

impl PublishDir {
    pub fn new(dir: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            hostname: hostname.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Final path of an artifact published at `now_secs`
    pub fn artifact_path(&self, kind: ArtifactKind, now_secs: i64) -> PathBuf {
        self.dir.join(artifact_name(&self.hostname, kind, now_secs))
    }

    /// Hidden working file inside the directory, e.g. `.kpi.tmp`
    pub fn work_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Write `temp_path` with `writer`, then rename it to `final_path`
///
/// The temporary file is truncated on open and synced before the rename. On
/// any failure the rename is skipped and the temporary file is removed.
pub fn commit<F>(temp_path: &Path, final_path: &Path, writer: F) -> SinkResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Err(e) = write_temp(temp_path, writer) {
        if let Err(rm) = fs::remove_file(temp_path) {
            if rm.kind() != io::ErrorKind::NotFound {
                warn!("Cannot remove {}: {}", temp_path.display(), rm);
            }
        }
        return Err(SinkError::commit_failed(temp_path, e));
    }
    promote(temp_path, final_path)
}

fn write_temp<F>(temp_path: &Path, writer: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp_path)?;
    let mut buf = BufWriter::new(file);
    writer(&mut buf)?;
    buf.flush()?;
    let file = buf.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Rename an already populated file into its published name
pub fn promote(staged_path: &Path, final_path: &Path) -> SinkResult<()> {
    fs::rename(staged_path, final_path).map_err(|e| {
        SinkError::commit_failed(
            final_path,
            format!("rename from {}: {}", staged_path.display(), e),
        )
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_format() {
        let secs = 1_700_000_000;
        let name = artifact_name("node1", ArtifactKind::Kpi, secs);
        assert_eq!(name, format!("node1-KPI-{}.txt", format_stamp(secs)));
        assert!(artifact_name("node1", ArtifactKind::Warning, secs).starts_with("node1-WARNING-"));
    }

    #[test]
    fn test_commit_renames_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".kpi.tmp");
        let target = dir.path().join("out.txt");

        commit(&tmp, &target, |w| w.write_all(b"a|1\nb|2\n")).unwrap();

        assert!(!tmp.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "a|1\nb|2\n");
    }

    #[test]
    fn test_commit_truncates_stale_temp() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".kpi.tmp");
        fs::write(&tmp, "a much longer leftover from a crashed run\n").unwrap();
        let target = dir.path().join("out.txt");

        commit(&tmp, &target, |w| w.write_all(b"short\n")).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "short\n");
    }

    #[test]
    fn test_failed_writer_skips_rename() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".kpi.tmp");
        let target = dir.path().join("out.txt");

        let err = commit(&tmp, &target, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();

        assert!(matches!(err, SinkError::CommitFailed { .. }));
        assert!(!target.exists());
        assert!(!tmp.exists());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let result = commit(&missing.join(".kpi.tmp"), &missing.join("out.txt"), |w| {
            w.write_all(b"x")
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_promote_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join(".alarm.tmp");
        fs::write(&staged, "line\n").unwrap();
        let target = dir.path().join("published.txt");

        promote(&staged, &target).unwrap();

        assert!(!staged.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "line\n");
    }
}
