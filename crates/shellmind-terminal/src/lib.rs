//! shellmind-terminal — the agent's interactive command executor.
//!
//! Runs one shell command at a time inside a fresh pseudo-terminal, with
//! real bidirectional I/O between the caller's stdin/stdout and the child,
//! and decides whether a command is safe enough to run without asking the
//! user first.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use shellmind_terminal::exec::{execute, ShellState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut state = ShellState::default();
//!     let result = execute(&mut state, "echo hello").await.unwrap();
//!     println!("{}", result.output);
//! }
//! ```

pub mod error;
pub mod exec;
pub mod safety;

pub use error::{Result, TerminalError};
pub use exec::{execute, ExecResult, ShellState};
