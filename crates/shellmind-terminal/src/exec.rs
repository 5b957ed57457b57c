//! The interactive command executor.
//!
//! Runs exactly one shell command inside a fresh pseudo-terminal, forwarding
//! the caller's stdin to the child and the child's combined stdout/stderr
//! back to the caller's stdout in real time, then reports whether the child
//! exited successfully together with everything it printed.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::{debug, warn};

use crate::error::{Result, TerminalError};

/// Command names that can change the shell's working directory and
/// therefore trigger the post-exec directory probe.
const DIR_CHANGING_COMMANDS: [&str; 3] = ["cd", "pushd", "popd"];

/// Timeout for the secondary directory-change probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one PTY command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// `true` when the child exited with status 0.
    pub success: bool,
    /// Everything the child wrote to the pty, ANSI escapes stripped.
    pub output: String,
}

/// The logical working directory of the agent's shell, persisted across
/// turns independently of the process's real `cwd`.
pub struct ShellState {
    cwd: String,
}

impl ShellState {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new(std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| ".".into()))
    }
}

/// RAII guard that puts the controlling terminal into raw mode and restores
/// it unconditionally on drop. A no-op when stdin is not a tty.
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        if crossterm::tty::IsTty::is_tty(&std::io::stdin()) {
            match crossterm::terminal::enable_raw_mode() {
                Ok(()) => return Self { enabled: true },
                Err(e) => warn!("could not set terminal to raw mode: {e}"),
            }
        }
        Self { enabled: false }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = crossterm::terminal::disable_raw_mode() {
                warn!("could not restore terminal settings: {e}");
            }
        }
    }
}

/// Execute `command` under a fresh PTY, rooted at `state`'s logical cwd.
///
/// Mirrors the contract: returns `(success, captured_output)`, writes output
/// to the real terminal as it arrives, and updates `state`'s cwd in place
/// when the command looks like it changed directory.
pub async fn execute(state: &mut ShellState, command: &str) -> Result<ExecResult> {
    let start_cwd = state.cwd.clone();
    let wrapped = format!("cd '{}' && {}", start_cwd.replace('\'', "'\\''"), command);

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

    let mut cmd = CommandBuilder::new("/bin/bash");
    cmd.arg("-c");
    cmd.arg(&wrapped);
    cmd.env("TERM", "xterm-256color");
    cmd.env("FORCE_COLOR", "1");
    cmd.env("COLORTERM", "truecolor");

    // portable_pty makes the slave the child's controlling terminal, which
    // puts it in its own session and process group — signals sent to that
    // group never touch our own process.
    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;
    drop(pair.slave);

    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

    let _raw_guard = RawModeGuard::enable();

    let output = Arc::new(Mutex::new(String::new()));
    let child_running = Arc::new(AtomicBool::new(true));

    // Master → stdout, mirrored into the capture buffer. Blocking reads run
    // on a dedicated OS thread so they never stall the Tokio runtime.
    let output_reader = Arc::clone(&output);
    let running_reader = Arc::clone(&child_running);
    let reader_thread = std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let clean = strip_ansi_escapes::strip(&buf[..n]);
                    let text = String::from_utf8_lossy(&clean).into_owned();
                    let mut stdout = std::io::stdout();
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                    output_reader.lock().unwrap().push_str(&text);
                }
                Err(e) => {
                    debug!("pty reader stopped: {e}");
                    break;
                }
            }
            if !running_reader.load(Ordering::Acquire) {
                break;
            }
        }
    });

    // Stdin → master. Stops once the child has exited; there is no portable
    // way to interrupt a blocking stdin read, so this thread is detached and
    // simply exits the process group's file descriptor once EOF arrives.
    let running_writer = Arc::clone(&child_running);
    let writer_thread = std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            if !running_writer.load(Ordering::Acquire) {
                break;
            }
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if writer.write_all(&buf[..n]).is_err() || writer.flush().is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let pid = child.process_id();
    let exit_status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .map_err(|e| TerminalError::PtySpawn(e.to_string()))?
        .map_err(|e| TerminalError::IoError(e))?;

    child_running.store(false, Ordering::Release);

    // Give the reader thread a brief window to drain residual output, then
    // stop waiting on it regardless — a stuck pty master must never hang
    // command execution forever.
    let _ = reader_thread.join();
    drop(writer_thread);

    // Belt-and-braces: escalate to the process group if anything is left
    // alive (normally the child has already exited by the time we get here).
    if let Some(pid) = pid {
        unsafe {
            if libc::kill(pid as i32, 0) == 0 {
                libc::killpg(pid as i32, libc::SIGTERM);
                std::thread::sleep(Duration::from_millis(200));
                if libc::kill(pid as i32, 0) == 0 {
                    libc::killpg(pid as i32, libc::SIGKILL);
                }
            }
        }
    }

    let captured = output.lock().unwrap().clone();
    let success = exit_status.success();

    if !command.trim().starts_with("sudo") {
        maybe_update_cwd(state, command, &start_cwd).await;
    }

    Ok(ExecResult {
        success,
        output: captured,
    })
}

/// After a command that might have changed directory, run a short probe to
/// find out where the shell actually ended up and, if it differs, update
/// the logical cwd in place.
async fn maybe_update_cwd(state: &mut ShellState, command: &str, start_cwd: &str) {
    let might_change_dir = command
        .trim()
        .split_whitespace()
        .any(|word| DIR_CHANGING_COMMANDS.contains(&word));
    if !might_change_dir {
        return;
    }

    let probe = format!(
        "cd '{}' && {} >/dev/null 2>&1 && pwd",
        start_cwd.replace('\'', "'\\''"),
        command
    );

    let result = tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::process::Command::new("/bin/bash")
            .arg("-c")
            .arg(&probe)
            .output(),
    )
    .await;

    if let Ok(Ok(output)) = result {
        if output.status.success() {
            let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !dir.is_empty() && std::path::Path::new(&dir).exists() && dir != state.cwd {
                state.cwd = dir;
            }
        }
    }
}
