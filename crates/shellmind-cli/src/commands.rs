//! Slash-command dispatch for `ReadInput` — `spec.md` §6.
//!
//! Resolved against `examples/original_source/src/ai_shell/app.py`'s
//! `_handle_input` / `_handle_conversation_commands` / `_handle_model_commands`,
//! with the rich-console output it prints reduced to the plain-text style
//! `render.rs` already uses for turn events.

use shellmind_core::{Config, Session};
use shellmind_store::ConversationStore;

/// What the REPL should do next after dispatching one line of input.
pub enum Dispatch {
    /// Not a recognised command — hand the line to the Turn Controller (AI
    /// mode) or run it directly as a shell command (direct mode).
    NotACommand,
    /// Handled here; nothing further to do this iteration.
    Handled,
    /// Replace the in-memory session with this freshly loaded one.
    ReplaceSession(Box<Session>),
    /// Switch to AI mode.
    SwitchAi,
    /// Switch to direct mode.
    SwitchDirect,
    /// Clear the screen and reset the conversation back to just the system
    /// prompt.
    ClearConversation,
    /// Archive the current session, then reset like `ClearConversation`.
    ArchiveConversation,
    /// Shrink oversized `Output:` sections still sitting in the payload.
    Compact,
    /// The user asked to exit (`/exit`, `/q`, `exit`, `quit`).
    Exit,
}

/// Returns `Some(Dispatch)` when `input` was a recognised slash/bare
/// command; `None` means the caller should fall through to direct-exec or
/// AI-mode processing. Takes `&mut Config` only to flip `web_search`-style
/// runtime toggles — currently just incognito, held by the caller instead.
pub fn dispatch(
    input: &str,
    session: &Session,
    store: &mut ConversationStore,
    config: &Config,
    incognito: &mut bool,
) -> Dispatch {
    let lower = input.to_lowercase();

    if lower.is_empty() {
        return Dispatch::Handled;
    }

    if matches!(lower.as_str(), "/exit" | "exit" | "quit" | ";q" | ":q" | "/q") {
        return Dispatch::Exit;
    }

    if matches!(lower.as_str(), "/clear" | "/new" | "/reset" | "/c" | "clear") {
        return Dispatch::ClearConversation;
    }

    if matches!(lower.as_str(), "/p" | "/payload") {
        show_payload(session, config);
        return Dispatch::Handled;
    }

    if matches!(lower.as_str(), "/help" | "/h" | "help") {
        show_help();
        return Dispatch::Handled;
    }

    if let Some(dispatch) = handle_conversation_command(input, &lower, session, store) {
        return dispatch;
    }

    if let Some(dispatch) = handle_model_command(input, &lower, config) {
        return dispatch;
    }

    match lower.as_str() {
        "/ai" => return Dispatch::SwitchAi,
        "/dr" => return Dispatch::SwitchDirect,
        "/inc" => {
            toggle_incognito(config, incognito, store);
            return Dispatch::Handled;
        }
        "/compact" => return Dispatch::Compact,
        "/resetconfig" => {
            println!("[notice] Edit the config file directly and restart to reset configuration.");
            return Dispatch::Handled;
        }
        "/status" => {
            show_status(session, store);
            return Dispatch::Handled;
        }
        _ => {}
    }

    Dispatch::NotACommand
}

fn handle_conversation_command(
    original: &str,
    lower: &str,
    session: &Session,
    store: &mut ConversationStore,
) -> Option<Dispatch> {
    if lower == "/save" {
        let name = format!("conversation_{}", session.started_at.timestamp());
        save_named(store, session, &name);
        return Some(Dispatch::Handled);
    }
    if let Some(name) = original.get(6..).filter(|_| lower.starts_with("/save ")) {
        save_named(store, session, name.trim());
        return Some(Dispatch::Handled);
    }

    if lower == "/load" {
        println!("[notice] Usage: /load <name|index>");
        list_saved(store);
        return Some(Dispatch::Handled);
    }
    if let Some(arg) = original.get(6..).filter(|_| lower.starts_with("/load ")) {
        let arg = arg.trim();
        let loaded = if let Ok(index) = arg.parse::<usize>() {
            store.load_recent_by_index(index)
        } else {
            store.load_named(arg)
        };
        return Some(match loaded {
            Ok(session) => Dispatch::ReplaceSession(Box::new(session)),
            Err(e) => {
                println!("[error] {e}");
                Dispatch::Handled
            }
        });
    }

    if lower.starts_with("/conversations") || lower.starts_with("/conversation") || lower.starts_with("/cv") {
        let parts: Vec<&str> = original.split_whitespace().collect();
        if parts.len() >= 2 && parts[1] == "-r" {
            let name = parts.get(2).copied();
            delete_conversation(store, name);
        } else {
            list_recent(store);
            println!();
            list_saved(store);
        }
        return Some(Dispatch::Handled);
    }

    if matches!(lower, "/recent" | "/r") {
        list_recent(store);
        return Some(Dispatch::Handled);
    }

    if lower == "/archive" {
        match store.archive(session) {
            Ok(()) => {
                println!("[notice] Conversation archived.");
                return Some(Dispatch::ArchiveConversation);
            }
            Err(e) => {
                println!("[error] {e}");
                return Some(Dispatch::Handled);
            }
        }
    }

    if let Some(name) = original.get(8..).filter(|_| lower.starts_with("/delete ")) {
        delete_conversation(store, Some(name.trim()));
        return Some(Dispatch::Handled);
    }

    None
}

fn handle_model_command(original: &str, lower: &str, config: &Config) -> Option<Dispatch> {
    if matches!(lower, "/models" | "/model" | "/m") {
        list_models(config);
        return Some(Dispatch::Handled);
    }
    if let Some(alias) = original.get(7..).filter(|_| lower.starts_with("/model ")) {
        switch_model(config, alias.trim());
        return Some(Dispatch::Handled);
    }
    None
}

fn save_named(store: &mut ConversationStore, session: &Session, name: &str) {
    match store.save_named(session, name, true) {
        Ok(true) => println!("[notice] Conversation saved as '{}'.", name),
        Ok(false) => println!("[notice] '{}' already exists; not overwritten.", name),
        Err(e) => println!("[error] {e}"),
    }
}

fn delete_conversation(store: &ConversationStore, name: Option<&str>) {
    let Some(name) = name else {
        println!("[notice] Usage: /delete <name>");
        return;
    };
    match store.delete_named(name) {
        Ok(()) => println!("[notice] Deleted '{}'.", name),
        Err(e) => println!("[error] {e}"),
    }
}

fn list_saved(store: &ConversationStore) {
    match store.list_saved() {
        Ok(entries) => {
            println!("Saved conversations:");
            for e in entries {
                println!("  {} ({} messages) - {}", e.name, e.message_count, e.summary);
            }
        }
        Err(e) => println!("[error] {e}"),
    }
}

fn list_recent(store: &ConversationStore) {
    match store.list_recent() {
        Ok(entries) => {
            println!("Recent conversations:");
            for (i, e) in entries.iter().enumerate() {
                println!("  [{}] {} ({} messages) - {}", i + 1, e.name, e.message_count, e.summary);
            }
        }
        Err(e) => println!("[error] {e}"),
    }
}

fn list_models(config: &Config) {
    println!("Available models:");
    for (alias, model) in &config.models.available {
        let marker = if config.models.response_model.as_deref() == Some(alias.as_str()) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {alias}: {} ({})", model.display_name, model.name);
    }
}

fn switch_model(config: &Config, alias: &str) {
    match config.models.available.get(alias) {
        Some(model) => println!("[notice] Would switch to '{}' ({}). Model switching takes effect on restart in this build.", alias, model.display_name),
        None => println!("[error] Unknown model alias '{alias}'."),
    }
}

fn toggle_incognito(config: &Config, incognito: &mut bool, store: &mut ConversationStore) {
    *incognito = !*incognito;
    if *incognito && !config.incognito.enabled {
        println!("[notice] Incognito mode is disabled in configuration.");
        *incognito = false;
        return;
    }
    store.set_incognito(*incognito);
    if *incognito {
        println!("[notice] Incognito mode ON - conversations will not be saved.");
    } else {
        println!("[notice] Incognito mode OFF.");
    }
}

fn show_payload(session: &Session, config: &Config) {
    println!("\nCurrent Conversation Payload:");
    let truncate_length = config.settings.payload_truncate_length;
    for (i, message) in session.messages.iter().enumerate() {
        let id_str = message.msg_id.map(|id| format!(" (ctx #{id})")).unwrap_or_default();
        let state_str = if message.state != shellmind_core::MessageState::Normal {
            format!(" [{:?}]", message.state)
        } else {
            String::new()
        };
        println!("\n[{}]{id_str}{state_str} {:?}:", i + 1, message.role);
        let content = &message.content;
        if content.chars().count() > truncate_length {
            let clipped: String = content.chars().take(truncate_length).collect();
            println!("{clipped}... [truncated]");
        } else {
            println!("{content}");
        }
    }
    println!("\nTotal messages: {}", session.messages.len());
}

fn show_status(session: &Session, store: &ConversationStore) {
    println!("\nConversation Status:");
    println!("Session ID: {}", session.id);
    println!("Started: {}", session.started_at);
    println!("Messages: {}", session.messages.len());
    println!("Status: {:?}", session.status);
    if let Some(request) = &session.original_request {
        println!("Original request: {request}");
    }
    let _ = store;
}

fn show_help() {
    println!(
        r#"
Commands:
  /help, /h              Show this help
  /clear, /new, /reset, /c   Start a new conversation
  /p, /payload           Show the current conversation payload
  /save [name]           Save the current conversation
  /load [name|index]     Load a saved or recent conversation
  /conversations, /cv    List saved and recent conversations (-r [name] to delete)
  /recent, /r            List recent conversations
  /archive               Archive the current conversation
  /delete <name>         Delete a saved conversation
  /status                Show session status
  /models, /model, /m    List configured model aliases
  /model <alias>         Switch models
  /ai                    Switch to AI mode
  /dr                    Switch to direct command mode
  /inc                   Toggle incognito mode
  /compact               Compact command-output messages in the payload
  !<command>             Run a shell command directly
  /exit, /q, exit, quit  Exit
"#
    );
}
