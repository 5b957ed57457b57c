//! Web search dispatch — the non-streaming sibling of the Chat Client,
//! used by the Turn Controller for `websearch` blocks.
//!
//! Grounded on `examples/original_source/src/ai_shell/web_search.py`: a
//! `websearch` block is answered by one non-streamed chat completion
//! against a separately configured search model (e.g. `perplexity/sonar-pro`),
//! not by an actual search-engine API call.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::client::Endpoint;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a web search assistant. Answer the user's question with current, accurate information. Include relevant sources, URLs, and specific details. Be thorough but concise.";

pub struct WebSearchClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    system_prompt: String,
    request_timeout: Duration,
}

impl WebSearchClient {
    pub fn new(endpoint: Endpoint, system_prompt: Option<String>, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            system_prompt: system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            request_timeout,
        }
    }

    /// Run one search query. Returns `None` on any transport, timeout, or
    /// malformed-response failure — the caller treats this the same as a
    /// failed search (`spec.md` §4.E "Web search failed for query").
    pub async fn search(&self, query: &str) -> Option<String> {
        let url = format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.endpoint.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": query},
            ],
        });

        let send = self
            .http
            .post(&url)
            .bearer_auth(&self.endpoint.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let resp = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(error = %e, "web search request failed");
                return None;
            }
            Err(_) => {
                warn!("web search request timed out");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "web search API error");
            return None;
        }

        let parsed: CompletionResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "malformed web search response");
                return None;
            }
        };

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}
