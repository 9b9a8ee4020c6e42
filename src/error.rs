use std::path::PathBuf;

use thiserror::Error;

use crate::worker::engine::EngineError;

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Service busy: admission queue is full (capacity {capacity}), retry later")]
    AdmissionRejected { capacity: usize },

    #[error("Service stopped")]
    ServiceStopped,

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Failed to release staged input {}: {source}", path.display())]
    ResourceCleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stage input: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Timed out waiting for result after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for TranscribeError {
    fn from(e: EngineError) -> Self {
        TranscribeError::ProcessingFailed(e.to_string())
    }
}

impl TranscribeError {
    /// True for errors a caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranscribeError::AdmissionRejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, TranscribeError>;
