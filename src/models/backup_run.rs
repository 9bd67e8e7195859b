use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// One timestamped execution of a full subtree mirror.
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub id: String,
    pub root_folder_id: String,
    pub destination_root: PathBuf,
    pub interval_seconds: u64,
    pub started_at: DateTime<Utc>,
}

impl BackupRun {
    pub fn new(
        root_folder_id: &str,
        destination_root: PathBuf,
        interval_seconds: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            root_folder_id: root_folder_id.to_string(),
            destination_root,
            interval_seconds,
            started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub id: String,
    pub path: PathBuf,
    pub error: String,
}

/// Counters collected while mirroring one subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub folders_mirrored: u64,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    pub skipped: Vec<SkippedEntry>,
    /// Folders whose listing had more entries than one page held.
    pub partial_folders: Vec<PathBuf>,
    pub renamed: Vec<PathBuf>,
    pub failed: Vec<FailedDownload>,
}

impl WalkReport {
    pub fn is_complete(&self) -> bool {
        self.partial_folders.is_empty() && self.failed.is_empty()
    }
}
