//! Error types for the shellmind-store crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no conversation named '{0}'")]
    NotFound(String),

    #[error("no conversation to save")]
    Empty,

    #[error("invalid recent-conversation index {index} (have {count})")]
    InvalidIndex { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for shellmind_core::ShellmindError {
    fn from(e: StoreError) -> Self {
        shellmind_core::ShellmindError::Persistence(e.to_string())
    }
}
