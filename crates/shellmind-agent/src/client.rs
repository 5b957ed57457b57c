//! The Chat Client — `spec.md` §4.B.
//!
//! Streams a chat completion from an OpenAI-compatible endpoint. Built
//! directly on the source workspace's existing SSE streaming loop
//! (`reqwest` + `bytes_stream()` + `futures_util::StreamExt`, `data: {...}`
//! line parsing, `[DONE]` sentinel, bearer auth), trimmed of the
//! native-tool-calling / multi-provider-registry machinery the teacher
//! crate carried — the protocol surface this spec needs is exactly
//! `POST /chat/completions` with `stream: true`.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use shellmind_core::{Message, Role};

use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// One of the two multiplexed endpoints a `ChatClient` can target —
/// the main remote profile or the optional local "incognito" profile.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub api_key: String,
    pub model: String,
}

/// Streams chat completions. Two profiles (remote, incognito) are
/// multiplexed by passing the relevant `Endpoint` per call; the caller (the
/// Turn Controller) decides which one is active for the in-flight task.
pub struct ChatClient {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl ChatClient {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            request_timeout,
        }
    }

    /// Stream one chat completion. `tx`, if given, receives live
    /// `StreamEvent`s as they arrive (for terminal display); the return
    /// value is always the final, fully-concatenated `(reply, reasoning)`.
    ///
    /// On transport/timeout/malformed-response errors, or on `cancel` being
    /// notified before the stream completes, returns `(None, None)` —
    /// callers must treat this the same as an empty reply (`spec.md` §4.B).
    pub async fn stream_reply(
        &self,
        endpoint: &Endpoint,
        messages: &[ApiMessage],
        cancel: &Notify,
        tx: Option<mpsc::Sender<StreamEvent>>,
    ) -> (Option<String>, Option<String>) {
        let body = build_request_body(endpoint, messages);
        let url = format!("{}/chat/completions", endpoint.url.trim_end_matches('/'));

        debug!(model = %endpoint.model, "sending streaming chat request");

        let send = self
            .http
            .post(&url)
            .bearer_auth(&endpoint.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let resp = tokio::select! {
            biased;
            _ = cancel.notified() => return (None, None),
            result = tokio::time::timeout(self.request_timeout, send) => {
                match result {
                    Ok(Ok(resp)) => resp,
                    Ok(Err(e)) => {
                        warn!(error = %e, "chat request failed");
                        return (None, None);
                    }
                    Err(_) => {
                        warn!("chat request timed out");
                        return (None, None);
                    }
                }
            }
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat API error");
            return (None, None);
        }

        process_stream(resp, cancel, tx).await
    }
}

/// A metadata-free message ready for the wire, produced by
/// `ContextManager::prepare_for_api`.
#[derive(Debug, Clone)]
pub struct ApiMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn build_request_body(endpoint: &Endpoint, messages: &[ApiMessage]) -> serde_json::Value {
    let msgs: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": role_str(m.role),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": endpoint.model,
        "messages": msgs,
        "stream": true,
    })
}

/// Consume an SSE byte stream, forwarding `StreamEvent`s live and
/// accumulating the final reply/reasoning text. Mirrors `openai.rs`'s
/// existing `process_openai_stream` loop, plus the `reasoning_content`
/// side-channel and cooperative cancellation.
async fn process_stream(
    resp: reqwest::Response,
    cancel: &Notify,
    tx: Option<mpsc::Sender<StreamEvent>>,
) -> (Option<String>, Option<String>) {
    let mut reply = String::new();
    let mut reasoning = String::new();
    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.notified() => return (None, None),
            next = byte_stream.next() => next,
        };

        let Some(chunk) = chunk else { break };
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                if let Some(tx) = &tx {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
                return (None, None);
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        let mut done = false;
        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                continue;
            };
            if data.trim() == "[DONE]" {
                done = true;
                break;
            }

            let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) else {
                continue;
            };
            for choice in &chunk_resp.choices {
                if let Some(content) = choice.delta.content.as_deref() {
                    if !content.is_empty() {
                        reply.push_str(content);
                        if let Some(tx) = &tx {
                            let _ = tx
                                .send(StreamEvent::TextDelta {
                                    text: content.to_string(),
                                })
                                .await;
                        }
                    }
                }
                if let Some(content) = choice.delta.reasoning_content.as_deref() {
                    if !content.is_empty() {
                        reasoning.push_str(content);
                        if let Some(tx) = &tx {
                            let _ = tx
                                .send(StreamEvent::Thinking {
                                    text: content.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }
        }

        line_buf = remainder;
        if done {
            break;
        }
    }

    if let Some(tx) = &tx {
        let _ = tx.send(StreamEvent::Done).await;
    }

    let reasoning = if reasoning.is_empty() { None } else { Some(reasoning) };
    (Some(reply), reasoning)
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}
