//! Error taxonomy shared by every core operation.

use std::path::PathBuf;

/// The result type for core operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("A target already uses {0}")]
    DuplicateTarget(String),
    #[error("Target '{0}' not found")]
    TargetNotFound(String),
    #[error("Stamp '{stamp}' not found in target '{target}'")]
    StampNotFound { target: String, stamp: String },
    #[error("Stamp '{stamp}' already exists in target '{target}', wait at least one second")]
    DuplicateStamp { target: String, stamp: String },
    #[error("Storage error at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Registry error: {0}")]
    Persistence(String),
    #[error("Source folder {} is not usable", .0.display())]
    InvalidSource(PathBuf),
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
    #[error("Timer for '{0}' is already running")]
    TimerAlreadyRunning(String),
    #[error("Timer for '{0}' is not enabled")]
    TimerDisabled(String),
}

impl BackupError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::StorageIo {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(e: serde_json::Error) -> Self {
        BackupError::Persistence(e.to_string())
    }
}
