//! shellmind — the agentic terminal shell binary.
//!
//! Wires the Conversation Store, Turn Controller, and terminal-facing
//! collaborators together into the REPL described by `spec.md` §5. Resolved
//! directly against `examples/original_source/src/ai_shell/app.py`'s
//! `AIShellApp.run` loop, with the rich-console presentation it does
//! replaced by `render.rs`'s plain-text printers.

mod commands;
mod interaction;
mod notify;
mod prompt;
mod render;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, Notify};
use tracing::{error, warn};

use shellmind_agent::{ChatClient, Endpoint, TurnConfig, TurnController, TurnOutcome, WebSearchClient};
use shellmind_core::{Config, Message, Role, Session};
use shellmind_store::ConversationStore;
use shellmind_terminal::safety;

use commands::Dispatch;
use interaction::TerminalInteraction;
use notify::DesktopNotifier;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "shellmind", about = "An agentic terminal shell")]
struct Cli {
    /// Path to config.toml. Defaults to ~/.shellmind/config.toml.
    #[arg(long)]
    config: Option<String>,
    /// Directory holding config.toml/context.txt. Defaults to ~/.shellmind.
    #[arg(long)]
    config_dir: Option<String>,
    /// Start in incognito mode (no persistence).
    #[arg(long)]
    incognito: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "shellmind=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        error!(error = %e, "fatal error");
        eprintln!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let context_file = shellmind_core::config::load_context_file(cli.config_dir.as_deref());
    let system_prompt = prompt::build_system_prompt(&config, &context_file);

    let mut incognito = cli.incognito;
    let mut store = ConversationStore::new(
        &config.conversations.storage_path,
        config.conversations.max_recent,
        config.conversations.auto_save_interval,
        incognito,
    )?;

    let mut session = start_or_resume_session(&config, &store, &system_prompt)?;

    let mut safe_commands = safety::default_safe_commands();
    if let Some(overrides) = &config.settings.safe_commands {
        safe_commands = overrides.iter().cloned().collect();
    }
    let turn_config = TurnConfig {
        max_retries: config.settings.max_retries,
        safe_commands,
    };

    let endpoint = Endpoint {
        url: config.api.url.clone(),
        api_key: config.api.api_key.clone(),
        model: config
            .models
            .active()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "gpt-4o".to_string()),
    };
    let incognito_endpoint = config.incognito.api.as_ref().map(|api| Endpoint {
        url: api.url.clone(),
        api_key: api.api_key.clone(),
        model: config
            .incognito
            .model
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "local-model".to_string()),
    });

    let chat = ChatClient::new(REQUEST_TIMEOUT);
    let websearch = if config.web_search.enabled {
        config.web_search.model.clone().map(|model| {
            WebSearchClient::new(
                Endpoint {
                    url: config
                        .web_search
                        .api_url
                        .clone()
                        .unwrap_or_else(|| config.api.url.clone()),
                    api_key: config
                        .web_search
                        .api_key
                        .clone()
                        .unwrap_or_else(|| config.api.api_key.clone()),
                    model,
                },
                config.web_search.system_prompt.clone(),
                REQUEST_TIMEOUT,
            )
        })
    } else {
        None
    };

    let mut controller = TurnController::new(
        turn_config,
        DesktopNotifier,
        TerminalInteraction,
        chat,
        websearch,
    );
    controller.restore(&session);

    let cancel = Arc::new(Notify::new());
    spawn_ctrl_c_watcher(cancel.clone());

    let mut ai_mode = config.settings.default_mode != "direct";

    println!("shellmind ready. Type /help for commands, Ctrl-C to cancel a turn.");

    loop {
        let prompt_label = if incognito {
            "[incognito]"
        } else if ai_mode {
            "[ai]"
        } else {
            "[direct]"
        };
        let Some(line) = read_line(prompt_label).await else {
            println!("\nGoodbye!");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match commands::dispatch(line, &session, &mut store, &config, &mut incognito) {
            Dispatch::Exit => {
                save_and_exit(&store, &session);
                break;
            }
            Dispatch::Handled => continue,
            Dispatch::ReplaceSession(new_session) => {
                session = *new_session;
                controller.restore(&session);
                continue;
            }
            Dispatch::ClearConversation => {
                session = Session::new(uuid::Uuid::new_v4().to_string());
                session.messages.push(Message::plain(Role::System, &system_prompt));
                controller.restore(&session);
                continue;
            }
            Dispatch::ArchiveConversation => {
                session = Session::new(uuid::Uuid::new_v4().to_string());
                session.messages.push(Message::plain(Role::System, &system_prompt));
                controller.restore(&session);
                continue;
            }
            Dispatch::Compact => {
                match controller.compact_payload(&mut session) {
                    0 => println!("[notice] Nothing to compact."),
                    n => println!("[notice] Compacted {n} command output message(s)."),
                }
                continue;
            }
            Dispatch::SwitchAi => {
                ai_mode = true;
                continue;
            }
            Dispatch::SwitchDirect => {
                ai_mode = false;
                continue;
            }
            Dispatch::NotACommand => {}
        }

        if let Some(command) = line.strip_prefix('!') {
            run_direct_command(command.trim()).await;
            continue;
        }

        if !ai_mode {
            run_direct_command(line).await;
            continue;
        }

        controller.ingest_user_input(&mut session, line);
        drive_turn(&mut controller, &mut session, &endpoint, &incognito_endpoint, incognito, &cancel).await;

        if let Err(e) = store.record_turn(&session) {
            warn!(error = %e, "failed to auto-save session");
        }
    }

    Ok(())
}

async fn drive_turn(
    controller: &mut TurnController<DesktopNotifier, TerminalInteraction>,
    session: &mut Session,
    endpoint: &Endpoint,
    incognito_endpoint: &Option<Endpoint>,
    incognito: bool,
    cancel: &Notify,
) {
    let active_endpoint = if incognito {
        incognito_endpoint.as_ref().unwrap_or(endpoint)
    } else {
        endpoint
    };

    let (turn_tx, turn_rx) = mpsc::channel(32);
    let (stream_tx, stream_rx) = mpsc::channel(32);
    render::spawn_turn_event_printer(turn_rx);
    render::spawn_stream_event_printer(stream_rx);

    let outcome = controller
        .run_turn(session, active_endpoint, &turn_tx, Some(stream_tx), cancel)
        .await;

    match outcome {
        TurnOutcome::NoReply => println!("[notice] No reply from the model."),
        TurnOutcome::ConversationReset => println!("[notice] Conversation was reset."),
        TurnOutcome::AwaitingUser | TurnOutcome::TaskComplete => {}
    }
}

async fn run_direct_command(command: &str) {
    if command.is_empty() {
        return;
    }
    let mut shell = shellmind_terminal::ShellState::default();
    match shellmind_terminal::execute(&mut shell, command).await {
        Ok(result) if !result.success => println!("[command failed]"),
        Err(e) => println!("[error] {e}"),
        _ => {}
    }
}

fn start_or_resume_session(
    config: &Config,
    store: &ConversationStore,
    system_prompt: &str,
) -> anyhow::Result<Session> {
    if config.conversations.resume_on_startup {
        if let Some(mut resumable) = store.resumable_session()? {
            print!("Resume previous conversation ({} messages)? [Y/n] ", resumable.messages.len());
            let _ = std::io::stdout().flush();
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            if !matches!(answer.trim().to_lowercase().as_str(), "n" | "no") {
                resumable.status = shellmind_core::SessionStatus::Resumed;
                return Ok(resumable);
            }
        }
    }

    let mut session = Session::new(uuid::Uuid::new_v4().to_string());
    session.messages.push(Message::plain(Role::System, system_prompt));
    Ok(session)
}

fn save_and_exit(store: &ConversationStore, session: &Session) {
    if let Err(e) = store.move_to_recent(session) {
        warn!(error = %e, "could not move session into recent ring on exit");
    }
    if let Err(e) = store.clear_active_file() {
        warn!(error = %e, "could not clear active session file on exit");
    }
}

async fn read_line(prompt_label: &str) -> Option<String> {
    print!("{prompt_label} > ");
    let _ = std::io::stdout().flush();
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(_) => None,
        }
    })
    .await
    .unwrap_or(None)
}

/// Watches for Ctrl-C and notifies the shared per-turn cancellation handle.
/// A fresh `Notify` would miss this if it were recreated after the signal
/// arrived, so the REPL hands this one `Arc` to every `run_turn` call and
/// relies on `notify_one`'s stored-permit semantics to survive the race
/// between "signal arrives" and "next `.notified()` call starts".
fn spawn_ctrl_c_watcher(cancel: Arc<Notify>) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.notify_one();
            }
        }
    });
}
