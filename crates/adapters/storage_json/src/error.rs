//! Storage-specific error type wrapping IO and JSON errors.

use schedule_state_domain::error::ScheduleError;

/// Errors originating from the JSON storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading, writing or renaming a file failed.
    #[error("io error")]
    Io(#[from] std::io::Error),

    /// A stored document is not valid JSON or has the wrong shape.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for ScheduleError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
