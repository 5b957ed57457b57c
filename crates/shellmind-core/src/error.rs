//! The top-level error taxonomy, matching `spec.md` §7's policy table.
//!
//! Narrower per-crate error enums (`TerminalError`, `StoreError`,
//! `AgentError`) convert into this one via `#[from]` at the crate boundary,
//! the way the source workspace's per-crate errors sit beneath one top-level
//! enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellmindError {
    /// Missing or malformed configuration — fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection, timeout, or malformed response from the chat endpoint.
    /// Non-fatal: the caller treats it like an empty reply.
    #[error("chat transport error: {0}")]
    Transport(String),

    /// More than one tool block in a reply, or an unknown block kind.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A PTY command exited non-zero, or failed to start.
    #[error("command failed: {0}")]
    Command(String),

    /// distill on a pruned message, untruncate on a non-truncated one, or an
    /// unknown message id.
    #[error("context operation error: {0}")]
    ContextOp(String),

    /// Could not write or read a session file; callers warn and continue in
    /// memory.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShellmindError {
    /// Short error code for structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ShellmindError::Config(_) => "CONFIG_ERROR",
            ShellmindError::Transport(_) => "TRANSPORT_ERROR",
            ShellmindError::Protocol(_) => "PROTOCOL_VIOLATION",
            ShellmindError::Command(_) => "COMMAND_FAILED",
            ShellmindError::ContextOp(_) => "CONTEXT_OP_ERROR",
            ShellmindError::Persistence(_) => "PERSISTENCE_ERROR",
            ShellmindError::Serialization(_) => "SERIALIZATION_ERROR",
            ShellmindError::Io(_) => "IO_ERROR",
            ShellmindError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellmindError>;
