use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid session ID: {0}")]
    InvalidId(String),

    #[error("Failed to read session data: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse session data: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Failed to create session directory: {0}")]
    CreateDirError(std::io::Error),
    #[error("Failed to write session data: {0}")]
    WriteError(std::io::Error),
    #[error("Failed to delete session directory: {0}")]
    DeleteError(std::io::Error),
    #[error("No data directory available for session storage")]
    NoDataDir,
}
