//! The Turn Controller — `spec.md` §4.E, the central state machine.
//!
//! Drives the user → model → tool → model cycle. Grounded directly on
//! `examples/original_source/src/ai_shell/app.py`'s `_handle_ai_response`
//! and its confirmation/retry handlers, restructured from the original's
//! scattered instance-method dispatch into a single `run_turn` loop over
//! the tagged `Action` variant `parser.rs` produces.

use std::collections::HashSet;

use tokio::sync::{mpsc, Notify};
use tracing::warn;

use shellmind_core::{Message, MessageState, Role, Session};
use shellmind_terminal::{safety, ShellState};

use crate::client::{ApiMessage, ChatClient, Endpoint};
use crate::context::ContextManager;
use crate::error::Result;
use crate::parser::{self, Action, ReplyTag};
use crate::stream::StreamEvent;
use crate::websearch::WebSearchClient;

/// After three consecutive protocol violations (more than one action
/// block in a single reply) the conversation resets (`spec.md` §4.D rule 1).
const MAX_REJUDGE_VIOLATIONS: u32 = 3;

/// Something the Turn Controller wants shown before it resumes driving.
/// Rendering is `shellmind-cli`'s concern; this is a plain, owned
/// description of the event.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    AssistantText(String),
    Thinking(String),
    Notice(String),
    CommandStarting { command: String, auto_approved: bool },
    CommandFinished { command: String, success: bool, truncated: bool },
    WebSearchStarting { query: String },
    WebSearchFailed { query: String },
}

/// Why `run_turn` stopped driving itself and returned control to the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model asked a question (`[QUESTION]`); wait for `ReadInput`.
    AwaitingUser,
    /// The model signalled `[COMPLETE]`.
    TaskComplete,
    /// The chat client failed outright, or the model's reply stayed empty
    /// through a retry.
    NoReply,
    /// Three consecutive multi-action violations reset the conversation
    /// back to just the system prompt.
    ConversationReset,
}

/// The user's answer to "Execute? [Y/n/a]".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandChoice {
    Run,
    RunAndAutoApproveRemaining,
    Decline,
}

/// The user's answer to "Do you want to continue trying? [Y/n]".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryChoice {
    Continue,
    Stop,
}

/// Collaborator for decisions only the person at the terminal can make.
/// `shellmind-cli` implements this against stdin; tests implement it
/// against a canned script.
#[async_trait::async_trait]
pub trait UserInteraction: Send + Sync {
    async fn confirm_command(&self, command: &str) -> CommandChoice;
    async fn decline_reason(&self) -> String;
    async fn confirm_retry(&self) -> RetryChoice;
}

/// Desktop notification sink, called at `[COMPLETE]`/`[QUESTION]` time
/// (`spec.md` §4.E invariant 6). `shellmind-cli` wires a `notify-rust`
/// backend; a no-op implementation is used under test.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}

pub struct TurnConfig {
    pub max_retries: u32,
    pub safe_commands: HashSet<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            safe_commands: safety::default_safe_commands(),
        }
    }
}

pub struct TurnController<N, U> {
    config: TurnConfig,
    notifier: N,
    interaction: U,
    context: ContextManager,
    chat: ChatClient,
    websearch: Option<WebSearchClient>,
    shell: ShellState,
    auto_approve_commands: bool,
    rejudge_count: u32,
    retry_count: u32,
}

impl<N, U> TurnController<N, U>
where
    N: NotificationSink,
    U: UserInteraction,
{
    pub fn new(
        config: TurnConfig,
        notifier: N,
        interaction: U,
        chat: ChatClient,
        websearch: Option<WebSearchClient>,
    ) -> Self {
        Self {
            config,
            notifier,
            interaction,
            context: ContextManager::new(),
            chat,
            websearch,
            shell: ShellState::default(),
            auto_approve_commands: false,
            rejudge_count: 0,
            retry_count: 0,
        }
    }

    /// After loading a persisted session, re-synchronise the id counter.
    pub fn restore(&mut self, session: &Session) {
        self.context.restore_ids(&session.messages);
    }

    /// Called from `ReadInput`: append the user's line as a fresh user
    /// turn, setting `original_request` when this starts a new task.
    pub fn ingest_user_input(&mut self, session: &mut Session, text: &str) {
        session.messages.push(Message::plain(Role::User, text));
        if session.original_request.is_none() || session.original_request.as_deref() == Some("") {
            session.original_request = Some(text.to_string());
        }
        self.rejudge_count = 0;
        self.retry_count = 0;
    }

    /// `/compact`: delegate to the Context Manager's blunt payload cleanup
    /// and report how many messages were shortened.
    pub fn compact_payload(&self, session: &mut Session) -> usize {
        self.context.compact_payload(&mut session.messages)
    }

    /// Drive `CallModel → ParseReply → dispatch` until the loop reaches a
    /// state that needs the caller (a question, completion, or failure).
    pub async fn run_turn(
        &mut self,
        session: &mut Session,
        endpoint: &Endpoint,
        events: &mpsc::Sender<TurnEvent>,
        stream_tx: Option<mpsc::Sender<StreamEvent>>,
        cancel: &Notify,
    ) -> TurnOutcome {
        loop {
            let api_messages = self.build_api_messages(session);
            let (reply, reasoning) = self
                .chat
                .stream_reply(endpoint, &api_messages, cancel, stream_tx.clone())
                .await;

            let Some(reply) = reply else {
                self.rejudge_count = 0;
                self.retry_count = 0;
                return TurnOutcome::NoReply;
            };

            if let Some(reasoning) = reasoning {
                let _ = events.send(TurnEvent::Thinking(reasoning)).await;
            }

            session.messages.push(Message::plain(Role::Assistant, &reply));

            if reply.trim().is_empty() {
                self.handle_empty_response(session, events).await;
                continue;
            }

            let parsed = parser::parse(&reply);
            let _ = events
                .send(TurnEvent::AssistantText(parsed.display_text.clone()))
                .await;

            match parsed.action {
                Some(Err(total)) => {
                    if self.handle_multiple_actions(session, events, total).await {
                        return TurnOutcome::ConversationReset;
                    }
                    continue;
                }
                Some(Ok(Action::Command(command))) => {
                    match self
                        .run_command_with_confirmation(session, events, &command)
                        .await
                    {
                        ControlFlow::Continue => continue,
                        ControlFlow::Stop(outcome) => return outcome,
                    }
                }
                Some(Ok(Action::WebSearch(query))) => {
                    self.run_web_search(session, events, &query).await;
                    continue;
                }
                Some(Ok(Action::ContextDistill { msg_id, summary })) => {
                    self.apply_distill(session, msg_id, summary);
                    continue;
                }
                Some(Ok(Action::ContextPrune { msg_ids })) => {
                    self.apply_prune(session, msg_ids);
                    continue;
                }
                Some(Ok(Action::ContextUntruncate { msg_id })) => {
                    self.apply_untruncate(session, msg_id);
                    continue;
                }
                None => match self.finish_text_reply(session, parsed.tag) {
                    ControlFlow::Continue => continue,
                    ControlFlow::Stop(outcome) => return outcome,
                },
            }
        }
    }

    fn build_api_messages(&self, session: &Session) -> Vec<ApiMessage> {
        let prunable = self.context.build_prunable_list(&session.messages);
        let mut out = Vec::with_capacity(session.messages.len());

        for (i, m) in session.messages.iter().enumerate() {
            if i == 0 && m.role == Role::System && !prunable.is_empty() {
                out.push(ApiMessage {
                    role: m.role,
                    content: format!("{}\n\n{}", m.content, prunable),
                });
            } else {
                out.push(ApiMessage::from(m));
            }
        }
        out
    }

    async fn handle_empty_response(
        &mut self,
        session: &mut Session,
        events: &mpsc::Sender<TurnEvent>,
    ) {
        let _ = events
            .send(TurnEvent::Notice(
                "AI provided empty response - treating as task completion signal.".to_string(),
            ))
            .await;

        let content = match session.original_request.take().filter(|s| !s.is_empty()) {
            Some(request) => format!(
                "SYSTEM MESSAGE: Task appears to be complete for: {request}. Please provide a brief summary of what was accomplished."
            ),
            None => {
                "SYSTEM MESSAGE: You provided an empty response. Please provide a proper response or explain why you cannot proceed."
                    .to_string()
            }
        };
        self.append_tool_result(session, &content, Some("Empty response handling".to_string()));
    }

    /// Returns `true` when the violation ceiling was hit and the
    /// conversation was reset back to just the system prompt — the caller
    /// must stop driving and return to `ReadInput` rather than immediately
    /// re-entering `CallModel` with an empty task context (`spec.md` §4.D
    /// rule 1, mirrored from the original's `rejudge = False` on reset).
    async fn handle_multiple_actions(
        &mut self,
        session: &mut Session,
        events: &mpsc::Sender<TurnEvent>,
        total: usize,
    ) -> bool {
        let _ = events
            .send(TurnEvent::Notice(format!(
                "Multiple actions detected ({total} actions). Asking AI to correct."
            )))
            .await;

        let content = format!(
            "SYSTEM MESSAGE: You provided {total} action blocks in one response, which is forbidden. You must provide EXACTLY ONE command, search, or context management block per response. Please choose the FIRST action you need to take and provide it alone with explanation."
        );
        self.append_tool_result(session, &content, Some("Multiple actions error".to_string()));

        self.rejudge_count += 1;
        if self.rejudge_count > MAX_REJUDGE_VIOLATIONS {
            let _ = events
                .send(TurnEvent::Notice(
                    "Too many multiple action violations. Resetting conversation.".to_string(),
                ))
                .await;
            let system_prompt = session.messages.first().cloned();
            session.messages.clear();
            if let Some(system_prompt) = system_prompt {
                session.messages.push(system_prompt);
            }
            self.context.reset();
            self.rejudge_count = 0;
            session.original_request = None;
            return true;
        }
        false
    }

    async fn run_command_with_confirmation(
        &mut self,
        session: &mut Session,
        events: &mpsc::Sender<TurnEvent>,
        command: &str,
    ) -> ControlFlow {
        if self.auto_approve_commands {
            return self.run_command(session, events, command, true).await;
        }

        if safety::is_command_safe(command, &self.config.safe_commands) {
            return self.run_command(session, events, command, true).await;
        }

        match self.interaction.confirm_command(command).await {
            CommandChoice::RunAndAutoApproveRemaining => {
                self.auto_approve_commands = true;
                self.run_command(session, events, command, false).await
            }
            CommandChoice::Run => self.run_command(session, events, command, false).await,
            CommandChoice::Decline => {
                let reason = self.interaction.decline_reason().await;
                let original = session.original_request.clone().unwrap_or_default();
                let content = format!(
                    "SYSTEM MESSAGE: User declined to run the command: {command}\nReason: {reason}\n\nPlease provide an alternative approach to complete the original request: {original}"
                );
                let label = format!("User declined: {}", clip60(command));
                self.append_tool_result(session, &content, Some(label));
                ControlFlow::Continue
            }
        }
    }

    async fn run_command(
        &mut self,
        session: &mut Session,
        events: &mpsc::Sender<TurnEvent>,
        command: &str,
        auto: bool,
    ) -> ControlFlow {
        let _ = events
            .send(TurnEvent::CommandStarting {
                command: command.to_string(),
                auto_approved: auto,
            })
            .await;

        let result = shellmind_terminal::execute(&mut self.shell, command).await;

        // A PTY/spawn-level error (not merely a nonzero exit status) is the
        // genuine "task failure" the retry ceiling guards against: the shell
        // itself never ran, so the usual continuation message would just
        // bounce the model through the same failure again. An ordinary
        // nonzero exit is left to the model to interpret and react to.
        let (success, output) = match result {
            Ok(r) => (r.success, r.output),
            Err(e) => {
                warn!(error = %e, "command execution failed");
                let message = format!("Error: {e}");
                let _ = events
                    .send(TurnEvent::CommandFinished {
                        command: command.to_string(),
                        success: false,
                        truncated: false,
                    })
                    .await;
                let _ = self
                    .handle_task_failure(session, command, &message, false)
                    .await;
                return ControlFlow::Continue;
            }
        };

        if success {
            self.retry_count = 0;
        }

        let (truncated_output, was_truncated, original_output) =
            self.context.auto_truncate(&output);

        let _ = events
            .send(TurnEvent::CommandFinished {
                command: command.to_string(),
                success,
                truncated: was_truncated,
            })
            .await;

        let label = format!("Command output: {}", clip60(command));

        let content = format!(
            "SYSTEM MESSAGE: Command executed: {command}\nOutput: {truncated_output}\nSuccess: {success}\n\nThe original request is not yet complete. Please continue with the next step."
        );

        if was_truncated {
            let full_content = format!(
                "SYSTEM MESSAGE: Command executed: {command}\nOutput: {}\nSuccess: {success}\n\nThe original request is not yet complete. Please continue with the next step.",
                original_output.unwrap_or_default()
            );
            self.append_truncated_tool_result(session, &content, &full_content, Some(label));
        } else {
            self.append_tool_result(session, &content, Some(label));
        }

        ControlFlow::Continue
    }

    async fn run_web_search(
        &mut self,
        session: &mut Session,
        events: &mpsc::Sender<TurnEvent>,
        query: &str,
    ) {
        let _ = events
            .send(TurnEvent::WebSearchStarting {
                query: query.to_string(),
            })
            .await;

        let label = clip60(query);

        let Some(client) = &self.websearch else {
            let content = format!(
                "SYSTEM MESSAGE: Web search failed for query: {query}\n\nPlease try a different approach or rephrase the search query."
            );
            self.append_tool_result(
                session,
                &content,
                Some(format!("Web search failed: {label}")),
            );
            return;
        };

        match client.search(query).await {
            Some(results) => {
                let content =
                    format!("SYSTEM MESSAGE: Web search executed for: {query}\n\nSearch Results:\n{results}");
                self.append_tool_result(session, &content, Some(format!("Web search: {label}")));
            }
            None => {
                let _ = events
                    .send(TurnEvent::WebSearchFailed {
                        query: query.to_string(),
                    })
                    .await;
                let content = format!(
                    "SYSTEM MESSAGE: Web search failed for query: {query}\n\nPlease try a different approach or rephrase the search query."
                );
                self.append_tool_result(
                    session,
                    &content,
                    Some(format!("Web search failed: {label}")),
                );
            }
        }
    }

    fn apply_distill(&mut self, session: &mut Session, msg_id: Option<u64>, summary: Option<String>) {
        let (content, ok) = match (msg_id, summary) {
            (Some(id), Some(summary)) => match self.context.distill(&mut session.messages, id, &summary) {
                Ok(()) => (
                    "SYSTEM MESSAGE: Context management applied. Continue with your task.".to_string(),
                    true,
                ),
                Err(_) => (
                    format!(
                        "SYSTEM MESSAGE: Could not distill message #{id}. It may not exist, may already be pruned, or is not a prunable message. Continue with your task."
                    ),
                    false,
                ),
            },
            _ => (
                "SYSTEM MESSAGE: Invalid context_distill format. Use: id: <number> and summary: <text>. Continue with your task.".to_string(),
                false,
            ),
        };
        let label = if ok { "Context management confirmation" } else { "Context management error" };
        self.append_tool_result(session, &content, Some(label.to_string()));
    }

    fn apply_prune(&mut self, session: &mut Session, msg_ids: Vec<u64>) {
        let (content, ok) = if msg_ids.is_empty() {
            (
                "SYSTEM MESSAGE: Invalid context_prune format. Use: ids: <id1>, <id2>, ... Continue with your task.".to_string(),
                false,
            )
        } else {
            match self.context.prune(&mut session.messages, &msg_ids) {
                Ok(_) => (
                    "SYSTEM MESSAGE: Context management applied. Continue with your task.".to_string(),
                    true,
                ),
                Err(_) => (
                    format!(
                        "SYSTEM MESSAGE: Could not prune messages with IDs {msg_ids:?}. They may not exist or are already pruned. Continue with your task."
                    ),
                    false,
                ),
            }
        };
        let label = if ok { "Context management confirmation" } else { "Context management error" };
        self.append_tool_result(session, &content, Some(label.to_string()));
    }

    fn apply_untruncate(&mut self, session: &mut Session, msg_id: Option<u64>) {
        let (content, ok) = match msg_id {
            Some(id) => match self.context.untruncate(&mut session.messages, id) {
                Ok(()) => (
                    "SYSTEM MESSAGE: Message untruncated - full content is now visible. Continue with your task.".to_string(),
                    true,
                ),
                Err(_) => (
                    format!(
                        "SYSTEM MESSAGE: Could not untruncate message #{id}. It may not be truncated or does not exist. Continue with your task."
                    ),
                    false,
                ),
            },
            None => (
                "SYSTEM MESSAGE: Invalid context_untruncate format. Use: id: <number>. Continue with your task.".to_string(),
                false,
            ),
        };
        let label = if ok { "Context management confirmation" } else { "Context management error" };
        self.append_tool_result(session, &content, Some(label.to_string()));
    }

    fn finish_text_reply(&mut self, session: &mut Session, tag: ReplyTag) -> ControlFlow {
        match tag {
            ReplyTag::Question => {
                self.notifier.notify(
                    "AI-Shell Question",
                    "The AI has a question and needs your input",
                );
                ControlFlow::Stop(TurnOutcome::AwaitingUser)
            }
            ReplyTag::Complete => {
                self.auto_approve_commands = false;
                self.retry_count = 0;
                session.original_request = None;
                self.notifier.notify(
                    "AI-Shell Complete",
                    "The AI has completed the requested task",
                );
                ControlFlow::Stop(TurnOutcome::TaskComplete)
            }
            ReplyTag::None => {
                let original = session.original_request.clone().unwrap_or_default();
                let content = format!(
                    "SYSTEM MESSAGE: The original request ({original}) is not yet complete. Please continue with the next step."
                );
                self.append_tool_result(session, &content, Some("Task continuation".to_string()));
                ControlFlow::Continue
            }
        }
    }

    fn append_tool_result(&mut self, session: &mut Session, content: &str, label: Option<String>) {
        let mut message = Message::plain(Role::User, content);
        self.context.ingest_tool_result(&mut message, label);
        session.messages.push(message);
    }

    /// Variant of `append_tool_result` used when the caller already ran
    /// auto-truncation itself and has both bodies in hand (the command
    /// path, which needs the *visible* body baked into the continuation
    /// sentence before truncation metadata is applied).
    fn append_truncated_tool_result(
        &mut self,
        session: &mut Session,
        visible_content: &str,
        full_content: &str,
        label: Option<String>,
    ) {
        let mut message = Message::plain(Role::User, visible_content);
        self.context.assign(&mut message, label);
        message.state = MessageState::Truncated;
        message.original_content = Some(full_content.to_string());
        session.messages.push(message);
    }

    /// `spec.md` §4.E invariant 3: a failed task may retry up to
    /// `max_retries` times, then ask the user whether to keep trying.
    pub async fn handle_task_failure(
        &mut self,
        session: &mut Session,
        command: &str,
        result: &str,
        success: bool,
    ) -> Result<()> {
        let label = format!("Task failure: {}", clip60(command));
        let original = session.original_request.clone().unwrap_or_default();

        if self.retry_count < self.config.max_retries {
            self.retry_count += 1;
            let content = format!(
                "SYSTEM MESSAGE: Command executed but task status check failed.\nCommand: {command}\nOutput: {result}\nSuccess: {success}\n\nPlease try a different approach to complete: {original}"
            );
            self.append_tool_result(session, &content, Some(label));
            return Ok(());
        }

        match self.interaction.confirm_retry().await {
            RetryChoice::Continue => {
                self.retry_count = 0;
                let content = format!(
                    "SYSTEM MESSAGE: Command executed but failed.\nCommand: {command}\nOutput: {result}\nSuccess: {success}\n\nUser requested to continue trying. Please try a different approach to complete: {original}"
                );
                self.append_tool_result(session, &content, Some(format!("Task failure retry: {}", clip60(command))));
            }
            RetryChoice::Stop => {
                let content = format!(
                    "SYSTEM MESSAGE: Task failed after {} attempts and user chose to stop. Please provide a summary of what was attempted and suggest alternatives.",
                    self.config.max_retries
                );
                self.append_tool_result(session, &content, Some("Task stopped".to_string()));
                self.retry_count = 0;
            }
        }
        Ok(())
    }
}

enum ControlFlow {
    Continue,
    Stop(TurnOutcome),
}

/// Matches the original's `command[:60] + "..."` convention verbatim.
fn clip60(s: &str) -> String {
    if s.chars().count() > 60 {
        let head: String = s.chars().take(60).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip60_matches_original_slicing() {
        let short = "ls -la";
        assert_eq!(clip60(short), "ls -la");

        let long = "a".repeat(70);
        let clipped = clip60(&long);
        assert_eq!(clipped.len(), 63);
        assert!(clipped.ends_with("..."));
    }
}
