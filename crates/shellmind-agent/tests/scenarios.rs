//! Turn Controller integration tests driven against a mocked chat-completion
//! endpoint, placed in a sibling `tests/` directory rather than an inline
//! `#[cfg(test)]` module.
//!
//! The mocked endpoint returns canned SSE bodies shaped exactly like
//! `client.rs`'s `process_stream` expects (`data: {...}\n\n` chunks,
//! `data: [DONE]\n\n` terminator).

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use shellmind_agent::{
    ChatClient, CommandChoice, Endpoint, NoopNotifier, RetryChoice, TurnConfig, TurnController,
    TurnOutcome, UserInteraction,
};
use shellmind_core::{Message, Role, Session};

/// Always approves commands and never gets asked twice in these scenarios.
struct AutoApprove;

#[async_trait::async_trait]
impl UserInteraction for AutoApprove {
    async fn confirm_command(&self, _command: &str) -> CommandChoice {
        CommandChoice::Run
    }
    async fn decline_reason(&self) -> String {
        String::new()
    }
    async fn confirm_retry(&self) -> RetryChoice {
        RetryChoice::Stop
    }
}

fn sse_body(content: &str) -> String {
    let chunk = serde_json::json!({
        "choices": [{"delta": {"content": content}}],
    });
    format!("data: {chunk}\n\ndata: [DONE]\n\n")
}

/// Matches requests whose JSON body's messages do *not* yet contain a
/// synthesised tool-result message — i.e. the very first model call of a
/// turn, before any command has executed.
struct IsFirstCall;

impl Match for IsFirstCall {
    fn matches(&self, request: &Request) -> bool {
        let body = String::from_utf8_lossy(&request.body);
        !body.contains("SYSTEM MESSAGE")
    }
}

/// Matches requests whose body already carries a command-output
/// continuation message (the second model call of a one-command turn).
struct IsFollowupCall;

impl Match for IsFollowupCall {
    fn matches(&self, request: &Request) -> bool {
        let body = String::from_utf8_lossy(&request.body);
        body.contains("SYSTEM MESSAGE: Command executed")
    }
}

fn test_config() -> TurnConfig {
    TurnConfig {
        max_retries: 10,
        safe_commands: HashSet::from(["uname".to_string()]),
    }
}

fn fresh_session() -> Session {
    let mut session = Session::new("test-session");
    session
        .messages
        .push(Message::plain(Role::System, "you are a terminal assistant"));
    session
}

/// Scenario 1: one-shot question answered with a single command, then a
/// `[COMPLETE]`-tagged summary.
#[tokio::test]
async fn one_shot_question_completes_after_one_command() {
    let server = MockServer::start().await;

    Mock::given(IsFirstCall)
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("I'll check the kernel version.\n\n```command\nuname -r\n```"),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(IsFollowupCall)
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body("The kernel version has been retrieved. [COMPLETE]"),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let endpoint = Endpoint {
        url: server.uri(),
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
    };

    let mut controller = TurnController::new(
        test_config(),
        NoopNotifier,
        AutoApprove,
        ChatClient::new(Duration::from_secs(5)),
        None,
    );

    let mut session = fresh_session();
    controller.ingest_user_input(&mut session, "what kernel am I running?");

    let (tx, _rx) = mpsc::channel(32);
    let cancel = Notify::new();
    let outcome = controller
        .run_turn(&mut session, &endpoint, &tx, None, &cancel)
        .await;

    assert_eq!(outcome, TurnOutcome::TaskComplete);
    assert!(session.original_request.is_none());
    // system, user, assistant(command), synthesised tool-result, final assistant summary
    assert!(session.messages.len() >= 5);
    assert_eq!(session.messages[0].role, Role::System);
    assert_eq!(session.messages[1].role, Role::User);
}

/// Scenario 3: a reply carrying two action blocks at once is a protocol
/// violation; after three in a row the conversation resets to just the
/// system prompt.
#[tokio::test]
async fn repeated_multi_block_replies_reset_the_conversation() {
    let server = MockServer::start().await;

    let double_action_body = sse_body(
        "Let's do both.\n\n```command\nls\n```\n\n```websearch\nhow to list files\n```",
    );

    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(double_action_body, "text/event-stream"))
        .mount(&server)
        .await;

    let endpoint = Endpoint {
        url: server.uri(),
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
    };

    let mut controller = TurnController::new(
        test_config(),
        NoopNotifier,
        AutoApprove,
        ChatClient::new(Duration::from_secs(5)),
        None,
    );

    let mut session = fresh_session();
    controller.ingest_user_input(&mut session, "list files and search how to list files");

    let (tx, _rx) = mpsc::channel(32);
    let cancel = Notify::new();
    let outcome = controller
        .run_turn(&mut session, &endpoint, &tx, None, &cancel)
        .await;

    assert_eq!(outcome, TurnOutcome::ConversationReset);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, Role::System);
    assert!(session.original_request.is_none());
}

/// Scenario 6: `cd` updates the logical cwd for the next command, but a
/// privilege-escalated `cd` is excluded from the directory probe.
#[tokio::test]
async fn cd_persists_across_commands_but_not_under_sudo() {
    let mut state = shellmind_terminal::ShellState::new("/tmp");

    let result = shellmind_terminal::execute(&mut state, "cd /tmp").await.unwrap();
    assert!(result.success);
    assert_eq!(state.cwd(), "/tmp");

    let result = shellmind_terminal::execute(&mut state, "pwd").await.unwrap();
    assert!(result.success);
    assert!(result.output.contains("/tmp"));

    let before = state.cwd().to_string();
    let _ = shellmind_terminal::execute(&mut state, "sudo cd /root").await;
    assert_eq!(state.cwd(), before);
}
