//! Error types for the shellmind-agent crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    ContextOp(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for shellmind_core::ShellmindError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::ContextOp(msg) => shellmind_core::ShellmindError::ContextOp(msg),
            other => shellmind_core::ShellmindError::Transport(other.to_string()),
        }
    }
}
