//! shellmind-core — shared data model, error taxonomy, and configuration.
//!
//! Every other crate in the workspace depends on this one for the `Message`
//! / `Session` data model (§3), the top-level error enum (§7), and the
//! structured configuration shape (§6). It has no dependency on any other
//! workspace crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Result, ShellmindError};
pub use types::{Message, MessageState, Role, Session, SessionStatus};
