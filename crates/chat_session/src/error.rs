use duck_llm::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Nothing to send")]
    EmptyInput,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
