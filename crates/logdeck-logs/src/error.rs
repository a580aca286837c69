use thiserror::Error;

/// Failures at the native log source boundary
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("native log source is disconnected")]
    Disconnected,

    #[error("session file not found: {0}")]
    NotFound(String),

    #[error("native request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while serializing or delivering an export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("export rejected by host: {0}")]
    Rejected(String),
}
