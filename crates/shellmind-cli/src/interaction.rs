//! Terminal-backed `UserInteraction` — the confirmation prompts the Turn
//! Controller needs whenever a command isn't on the safety allow-list, or a
//! retry ceiling is hit. Grounded on `terminal_input.get_confirmation` /
//! `get_reason_input` in `examples/original_source/src/ai_shell/
//! terminal_input.py`: a plain blocking stdin prompt, default answer
//! shown in brackets, empty input accepts the default.

use shellmind_agent::{CommandChoice, RetryChoice, UserInteraction};

pub struct TerminalInteraction;

fn read_line_blocking(prompt: &str) -> String {
    use std::io::Write;
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

#[async_trait::async_trait]
impl UserInteraction for TerminalInteraction {
    async fn confirm_command(&self, command: &str) -> CommandChoice {
        let command = command.to_string();
        tokio::task::spawn_blocking(move || {
            let answer = read_line_blocking(&format!("Execute `{command}`? [Y/n/a] "));
            match answer.to_lowercase().as_str() {
                "n" | "no" => CommandChoice::Decline,
                "a" | "all" => CommandChoice::RunAndAutoApproveRemaining,
                _ => CommandChoice::Run,
            }
        })
        .await
        .unwrap_or(CommandChoice::Decline)
    }

    async fn decline_reason(&self) -> String {
        tokio::task::spawn_blocking(|| read_line_blocking("Reason for decline: "))
            .await
            .unwrap_or_default()
    }

    async fn confirm_retry(&self) -> RetryChoice {
        tokio::task::spawn_blocking(|| {
            let answer = read_line_blocking("Maximum retry attempts reached. Continue trying? [y/N] ");
            match answer.to_lowercase().as_str() {
                "y" | "yes" => RetryChoice::Continue,
                _ => RetryChoice::Stop,
            }
        })
        .await
        .unwrap_or(RetryChoice::Stop)
    }
}
