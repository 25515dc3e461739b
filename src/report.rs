//! Persistent, deduplicated record of failed downloads.
//!
//! Every terminal per-track failure is appended once to a log file under
//! the library root, keyed by track id and file name, so a batch can be
//! re-run and audited without the same track spamming the log. The file
//! is truncated when the process starts; within a run each signature
//! appears at most once.

use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::{error::Result, track::TrackId};

/// Append-only failure log with content dedup.
pub struct FailureLog {
    path: PathBuf,
    seen: HashSet<String>,
}

impl FailureLog {
    /// Creates (and truncates) the log file, creating parent directories
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(&path)?;

        Ok(Self {
            path,
            seen: HashSet::new(),
        })
    }

    /// Records one failure, unless its signature was already recorded.
    ///
    /// The signature is `track id + file name`: the same track failing
    /// for the same output is one event no matter how many collections
    /// wanted it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` if the log cannot be appended.
    pub fn record(&mut self, track_id: TrackId, file_name: &str, reason: &str) -> Result<()> {
        let signature = format!("{track_id}\t{file_name}");
        if !self.seen.insert(signature.clone()) {
            return Ok(());
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{signature}\t{reason}")?;

        Ok(())
    }

    /// Number of distinct failures recorded this run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track_id(id: u64) -> TrackId {
        TrackId::new(id).unwrap()
    }

    #[test]
    fn records_one_line_per_signature() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed.log");
        let mut log = FailureLog::create(&path).unwrap();

        log.record(track_id(1), "A - B", "no usable media").unwrap();
        log.record(track_id(1), "A - B", "no usable media").unwrap();
        log.record(track_id(1), "A - B", "different reason, same signature")
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("no usable media"));
    }

    #[test]
    fn distinct_signatures_get_distinct_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed.log");
        let mut log = FailureLog::create(&path).unwrap();

        log.record(track_id(1), "A - B", "x").unwrap();
        log.record(track_id(2), "A - B", "x").unwrap();
        log.record(track_id(1), "A - C", "x").unwrap();

        assert_eq!(log.len(), 3);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn truncates_previous_runs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed.log");
        fs::write(&path, "1\tA - B\tstale entry\n").unwrap();

        let log = FailureLog::create(&path).unwrap();
        assert!(log.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep").join("failed.log");
        let mut log = FailureLog::create(&path).unwrap();
        log.record(track_id(9), "X - Y", "gone").unwrap();
        assert!(path.exists());
    }
}
