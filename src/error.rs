use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used when a failure is recorded in a batch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Input,
    Metadata,
    Io,
    ExternalTool,
    Config,
}

impl MuxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MuxError::Input(_) => ErrorKind::Input,
            MuxError::Metadata(_) => ErrorKind::Metadata,
            MuxError::Io(_) => ErrorKind::Io,
            MuxError::ExternalTool(_) | MuxError::Json(_) => ErrorKind::ExternalTool,
            MuxError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
