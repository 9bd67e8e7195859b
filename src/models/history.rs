use serde::{Deserialize, Serialize};

/// Outcome of a backup run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Running => "running",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
            BackupStatus::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(BackupStatus::Running),
            "completed" => Some(BackupStatus::Completed),
            "failed" => Some(BackupStatus::Failed),
            "stopped" => Some(BackupStatus::Stopped),
            _ => None,
        }
    }
}

/// Backup history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHistoryEntry {
    pub id: String,
    pub root_folder_id: String,
    pub destination: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: BackupStatus,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    pub skipped: u64,
    pub tree_digest: Option<String>,
    pub error: Option<String>,
}
