use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to read config file '{path}': {cause}")]
    ConfigRead { path: PathBuf, cause: io::Error },

    #[error("Failed to parse config file '{path}': {cause}")]
    ConfigParse {
        path: PathBuf,
        cause: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read client secret file '{path}': {cause}")]
    SecretRead { path: PathBuf, cause: io::Error },

    #[error("Failed to parse client secret file '{path}': {reason}")]
    SecretParse { path: PathBuf, reason: String },

    #[error("Failed to access token cache '{path}': {reason}")]
    TokenCache { path: PathBuf, reason: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request was not authorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Remote item not found: {id}")]
    NotFound { id: String },

    #[error("Drive API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of '{file_id}' to '{path}' failed after {attempts} attempts: {cause}")]
    ChunkRetriesExhausted {
        file_id: String,
        path: PathBuf,
        attempts: u32,
        cause: Box<BackupError>,
    },

    #[error("Download of '{file_id}' ended after {received} of {expected} bytes")]
    Truncated {
        file_id: String,
        received: u64,
        expected: u64,
    },

    #[error("Failed to create directory '{path}': {cause}")]
    CreateDir { path: PathBuf, cause: io::Error },

    #[error("Failed to write file '{path}': {cause}")]
    FileWrite { path: PathBuf, cause: io::Error },

    #[error("Two remote entries map to the same local path '{path}'")]
    NameCollision { path: PathBuf },

    #[error("Backup was cancelled")]
    Cancelled,

    #[error("Backup worker thread panicked")]
    WorkerPanicked,

    #[error("Failed to open or create database '{path}': {reason}")]
    DatabaseConnection { path: String, reason: String },

    #[error("Database query failed for '{operation}': {cause}")]
    DatabaseQuery {
        operation: String,
        cause: rusqlite::Error,
    },

    #[error("Failed to insert into {table} for {id}: {cause}")]
    DatabaseInsert {
        table: String,
        id: String,
        cause: rusqlite::Error,
    },

    #[error("Failed to update {table} for ID {id}: {cause}")]
    DatabaseUpdate {
        table: String,
        id: String,
        cause: rusqlite::Error,
    },

    #[error("Failed to hash file '{path}': {cause}")]
    HashError { path: PathBuf, cause: io::Error },

    #[error("Failed to read directory entry: {0}")]
    DirectoryRead(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BackupError {
    /// Errors worth retrying: rate limits, server faults, dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            BackupError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            BackupError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
