//! Capture artifacts and job identity
//!
//! An artifact is identified by its stored path and its ingestion time (the
//! stored file's modification time). Both trigger sources build artifacts the
//! same way, so an upload that also lands in the watched directory collapses
//! onto a single job key.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which trigger produced the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Upload,
    Watch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureArtifact {
    /// File (or directory) name, e.g. `a.pcap`
    pub name: String,
    /// Canonical storage path
    pub path: PathBuf,
    pub origin: ArtifactOrigin,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

impl CaptureArtifact {
    /// Describe an already-stored capture file or capture directory
    pub fn from_path(path: impl AsRef<Path>, origin: ArtifactOrigin) -> io::Result<Self> {
        let path = path.as_ref().canonicalize()?;
        let metadata = std::fs::metadata(&path)?;
        let ingested_at: DateTime<Utc> = metadata.modified()?.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            path,
            origin,
            size_bytes: metadata.len(),
            ingested_at,
        })
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Deterministic job key for this artifact
    pub fn job_key(&self) -> JobKey {
        let mut hasher = Sha256::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let nanos = self.ingested_at.timestamp_nanos_opt().unwrap_or_else(|| self.ingested_at.timestamp());
        hasher.update(nanos.to_le_bytes());
        hasher.update(self.size_bytes.to_le_bytes());
        JobKey(hex::encode(hasher.finalize()))
    }
}

/// Hex SHA-256 identity of a capture artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in directory names and logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl From<String> for JobKey {
    fn from(value: String) -> Self {
        JobKey(value)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_same_file_same_key_across_origins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pcap");
        std::fs::write(&path, b"capture").unwrap();

        let uploaded = CaptureArtifact::from_path(&path, ArtifactOrigin::Upload).unwrap();
        let watched = CaptureArtifact::from_path(&path, ArtifactOrigin::Watch).unwrap();

        assert_eq!(uploaded.job_key(), watched.job_key());
        assert_eq!(uploaded.name, "a.pcap");
        assert_eq!(uploaded.stem(), "a");
        assert_eq!(uploaded.size_bytes, 7);
        assert_eq!(uploaded.job_key().as_str().len(), 64);
        assert_eq!(uploaded.job_key().short().len(), 12);
    }

    #[test]
    fn test_different_files_different_keys() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.pcap");
        let b = dir.path().join("b.pcap");
        std::fs::write(&a, b"capture").unwrap();
        std::fs::write(&b, b"capture").unwrap();

        let a = CaptureArtifact::from_path(&a, ArtifactOrigin::Upload).unwrap();
        let b = CaptureArtifact::from_path(&b, ArtifactOrigin::Upload).unwrap();
        assert_ne!(a.job_key(), b.job_key());
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let result = CaptureArtifact::from_path(dir.path().join("nope.pcap"), ArtifactOrigin::Watch);
        assert!(result.is_err());
    }
}
