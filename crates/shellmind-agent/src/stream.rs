//! Streaming events emitted while consuming a chat-completion response.

/// One incremental event from `ChatClient::stream_reply`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental reply text.
    TextDelta { text: String },

    /// Incremental `reasoning_content` side-channel text. Forwarded to the
    /// terminal live by the caller; never stored in the session (`spec.md`
    /// §6).
    Thinking { text: String },

    /// The stream completed successfully.
    Done,

    /// The stream failed; the caller treats this like an empty reply.
    Error { message: String },
}

/// Parse a single SSE line (`event: ...` / `data: ...`).
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ").map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}
