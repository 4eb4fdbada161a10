use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid rule table: {0}")]
    InvalidRules(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
