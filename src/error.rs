/// Centralized error types for the pipeline
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // Feed errors
    #[error("Feed connection failed: {0}")]
    FeedConnection(String),

    #[error("Malformed feed message: {0}")]
    MalformedMessage(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    // Analytics errors
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Zero variance in series: {0}")]
    ZeroVariance(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Deserialization failed: {0}")]
    Deserialization(#[from] serde_json::Error),

    // File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Check if error is absorbed by a retry loop rather than surfaced
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::FeedConnection(_)
                | PipelineError::MalformedMessage(_)
                | PipelineError::Persistence(_)
        )
    }
}
