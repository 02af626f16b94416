use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShioriError {
    #[error("media index error: {0}")]
    Index(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid progress value: {0}")]
    InvalidProgress(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
