//! Alert Store - append-only JSONL alert log
//!
//! One complete JSON object per line. A crash mid-append can only leave a
//! truncated last line; readers skip it and the next append terminates it
//! first, so earlier records are never damaged.
//!
//! Appends are serialized through one mutex and skip alerts whose identity is
//! already in the log. The identity index is rebuilt from the file on first
//! use, so it survives restarts.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::record::{Alert, AlertIdentity};
use crate::logic::artifact::JobKey;
use crate::logic::error::{PipelineError, PipelineResult};

pub struct AlertStore {
    path: PathBuf,
    /// Identities already on disk; `None` until first append
    index: Mutex<Option<HashSet<AlertIdentity>>>,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append alerts not yet stored; returns how many were written
    pub fn append(&self, alerts: &[Alert]) -> PipelineResult<usize> {
        if alerts.is_empty() {
            return Ok(0);
        }

        let mut guard = self.index.lock();
        if guard.is_none() {
            let existing = self.scan_identities().map_err(|e| self.storage_error(e))?;
            *guard = Some(existing);
        }
        let index = match guard.as_mut() {
            Some(index) => index,
            None => return Err(PipelineError::Internal("alert index not loaded".to_string())),
        };

        let mut fresh = HashSet::new();
        let mut buffer = Vec::new();
        for alert in alerts {
            let identity = alert.identity();
            if index.contains(&identity) || fresh.contains(&identity) {
                log::debug!(
                    "Skipping duplicate alert {} row {} ({})",
                    identity.flow_file,
                    identity.row,
                    alert.pcap
                );
                continue;
            }
            serde_json::to_writer(&mut buffer, alert)
                .map_err(|e| PipelineError::StorageFailure(format!("cannot encode alert: {}", e)))?;
            buffer.push(b'\n');
            fresh.insert(identity);
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.write_batch(&buffer).map_err(|e| self.storage_error(e))?;

        let written = fresh.len();
        index.extend(fresh);
        log::info!("Appended {} alert(s) to {}", written, self.path.display());
        Ok(written)
    }

    /// Up to `limit` most recent alerts, oldest first. Never fails.
    pub fn read_recent(&self, limit: usize) -> Vec<Alert> {
        if limit == 0 {
            return Vec::new();
        }

        let mut window = VecDeque::with_capacity(limit.min(1024));
        let result = self.for_each_record(|alert| {
            if window.len() == limit {
                window.pop_front();
            }
            window.push_back(alert);
        });

        if let Err(e) = result {
            log::warn!("Cannot read alert log {}: {}", self.path.display(), e);
        }
        window.into_iter().collect()
    }

    /// Every stored alert of one artifact, in log order. Never fails.
    pub fn alerts_for(&self, key: &JobKey) -> Vec<Alert> {
        let mut found = Vec::new();
        let result = self.for_each_record(|alert| {
            if alert.artifact_key.as_ref() == Some(key) {
                found.push(alert);
            }
        });

        if let Err(e) = result {
            log::warn!("Cannot read alert log {}: {}", self.path.display(), e);
        }
        found
    }

    /// Number of readable records
    pub fn len(&self) -> usize {
        let mut count = 0;
        if let Err(e) = self.for_each_record(|_| count += 1) {
            log::warn!("Cannot read alert log {}: {}", self.path.display(), e);
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // FILE ACCESS
    // ========================================================================

    fn write_batch(&self, buffer: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        if needs_terminator(&mut file)? {
            log::warn!("Alert log {} ends with a partial record, terminating it", self.path.display());
            file.write_all(b"\n")?;
        }

        file.write_all(buffer)?;
        file.flush()?;
        file.sync_data()
    }

    fn scan_identities(&self) -> io::Result<HashSet<AlertIdentity>> {
        let mut identities = HashSet::new();
        self.for_each_record(|alert| {
            identities.insert(alert.identity());
        })?;
        Ok(identities)
    }

    /// Decode every line; undecodable lines are logged and skipped.
    /// A missing file has no records.
    fn for_each_record<F>(&self, mut visit: F) -> io::Result<()>
    where
        F: FnMut(Alert),
    {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for (line_no, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Alert>(&line) {
                Ok(alert) => visit(alert),
                Err(e) => log::warn!(
                    "Skipping malformed alert at {}:{}: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ),
            }
        }
        Ok(())
    }

    fn storage_error(&self, err: io::Error) -> PipelineError {
        PipelineError::StorageFailure(format!("{}: {}", self.path.display(), err))
    }
}

/// Non-empty file whose last byte is not a newline
fn needs_terminator(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn alert(key: &str, row: usize) -> Alert {
        Alert {
            timestamp: Utc::now(),
            pcap: "a.pcap".to_string(),
            artifact_key: Some(JobKey::from(key.to_string())),
            flow_file: "a.pcap_Flow.csv".to_string(),
            row,
            prediction: 1,
            confidence: None,
            flow: BTreeMap::new(),
        }
    }

    #[test]
    fn test_absent_store_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.jsonl"));

        assert!(store.read_recent(100).is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_and_read_recent_window() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("nested").join("alerts.jsonl"));

        let batch: Vec<Alert> = (0..5).map(|row| alert("k", row)).collect();
        assert_eq!(store.append(&batch).unwrap(), 5);

        let recent = store.read_recent(3);
        let rows: Vec<usize> = recent.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);

        assert_eq!(store.read_recent(100).len(), 5);
        assert!(store.read_recent(0).is_empty());
    }

    #[test]
    fn test_alerts_for_one_artifact() {
        let dir = TempDir::new().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.jsonl"));
        store.append(&[alert("k1", 0), alert("k2", 0), alert("k1", 2)]).unwrap();

        let found = store.alerts_for(&JobKey::from("k1".to_string()));
        let rows: Vec<usize> = found.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![0, 2]);
        assert!(store.alerts_for(&JobKey::from("k3".to_string())).is_empty());
    }

    #[test]
    fn test_duplicate_identities_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let store = AlertStore::new(&path);

        assert_eq!(store.append(&[alert("k", 1), alert("k", 1)]).unwrap(), 1);
        assert_eq!(store.append(&[alert("k", 1), alert("k", 2)]).unwrap(), 1);
        assert_eq!(store.len(), 2);

        // Index rebuilt from disk after restart
        let reopened = AlertStore::new(&path);
        assert_eq!(reopened.append(&[alert("k", 2)]).unwrap(), 0);
        assert_eq!(reopened.append(&[alert("other", 2)]).unwrap(), 1);
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_truncated_trailing_line_is_recovered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let store = AlertStore::new(&path);
        store.append(&[alert("k", 0)]).unwrap();

        // Simulate a crash mid-write
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"timestamp":"2024-05-01T10:0"#).unwrap();
        drop(file);

        assert_eq!(store.len(), 1);

        let reopened = AlertStore::new(&path);
        assert_eq!(reopened.append(&[alert("k", 1)]).unwrap(), 1);

        let rows: Vec<usize> = reopened.read_recent(10).iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![0, 1]);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_concurrent_appends_keep_lines_whole() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(AlertStore::new(dir.path().join("alerts.jsonl")));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for row in 0..25 {
                        store.append(&[alert(&format!("k{}", t), row)]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
