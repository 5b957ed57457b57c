//! Plain-text rendering of `TurnEvent`/`StreamEvent` to the terminal.
//!
//! Prompt composition, panels, and markdown rendering are the (out of
//! scope, per `spec.md` §1) terminal UI layer; this is the minimal plain
//! output the core's events need to be visible at all.

use tokio::sync::mpsc;

use shellmind_agent::{StreamEvent, TurnEvent};

pub fn spawn_turn_event_printer(mut rx: mpsc::Receiver<TurnEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_turn_event(event);
        }
    });
}

pub fn spawn_stream_event_printer(mut rx: mpsc::Receiver<StreamEvent>) {
    tokio::spawn(async move {
        let mut thinking_open = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Thinking { text } => {
                    if !thinking_open {
                        print!("\n[thinking] ");
                        thinking_open = true;
                    }
                    print!("{text}");
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
                StreamEvent::Done => {
                    if thinking_open {
                        println!();
                        thinking_open = false;
                    }
                }
                StreamEvent::Error { message } => {
                    eprintln!("\n[stream error] {message}");
                    thinking_open = false;
                }
                StreamEvent::TextDelta { .. } => {}
            }
        }
    });
}

fn print_turn_event(event: TurnEvent) {
    match event {
        TurnEvent::AssistantText(text) => {
            if !text.trim().is_empty() {
                println!("\n{text}\n");
            }
        }
        TurnEvent::Thinking(_) => {}
        TurnEvent::Notice(text) => println!("[notice] {text}"),
        TurnEvent::CommandStarting { command, auto_approved } => {
            let marker = if auto_approved { "auto" } else { "confirmed" };
            println!("\n$ {command}  [{marker}]");
        }
        TurnEvent::CommandFinished { command: _, success, truncated } => {
            let status = if success { "ok" } else { "failed" };
            let trunc = if truncated { ", output truncated" } else { "" };
            println!("[command {status}{trunc}]");
        }
        TurnEvent::WebSearchStarting { query } => println!("\n[web search] {query}"),
        TurnEvent::WebSearchFailed { query } => println!("[web search failed] {query}"),
    }
}
