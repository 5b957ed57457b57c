//! The conversation data model shared by the agent and the store.
//!
//! `Message` and `Session` are the two structures every other crate in the
//! workspace operates on: the Context Manager mutates `Message` bodies and
//! metadata in place, the Turn Controller appends to a `Session`'s message
//! list, and the Conversation Store serialises a `Session` to disk verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Where a message's body currently stands relative to its original content.
///
/// Only meaningful when the message carries an `msg_id` — the system prompt
/// and the original user/assistant turns are never assigned one and are
/// always implicitly `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    #[default]
    Normal,
    Truncated,
    Distilled,
    Pruned,
}

/// One entry in a conversation's history.
///
/// `msg_id` is `None` for the system prompt and for the original user prompt
/// / assistant reply that make up a plain turn — those are never rewritten.
/// It is `Some` for every tool-result message injected as
/// `SYSTEM MESSAGE: ...`, which is what makes a message eligible for
/// distill/prune/untruncate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default)]
    pub state: MessageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Message {
    /// A plain, non-prunable message — the system prompt, a user prompt, or
    /// an assistant reply. Never carries an `msg_id`.
    pub fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            msg_id: None,
            state: MessageState::Normal,
            original_content: None,
            label: None,
        }
    }

    pub fn is_prunable(&self) -> bool {
        self.msg_id.is_some()
    }
}

/// Lifecycle status of a session, mirroring `spec.md` §3 verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Resumed,
    Saved,
    Loaded,
    Recent,
    Archived,
}

/// An ordered list of messages plus the metadata the Conversation Store and
/// Turn Controller both need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Start a brand new, empty session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            started_at: now,
            last_updated: now,
            last_used: now,
            status: SessionStatus::Active,
            original_request: None,
            summary: None,
            messages: Vec::new(),
        }
    }

    /// Derive the short label shown in conversation listings: the first 50
    /// characters of the first user message, or a placeholder when there is
    /// none yet.
    pub fn derive_summary(&self) -> String {
        let Some(first_user) = self.messages.iter().find(|m| matches!(m.role, Role::User)) else {
            return "Empty conversation".to_string();
        };
        truncate_chars(&first_user.content, 50)
    }
}

/// Truncate `s` to at most `max_chars` characters, appending `...` when
/// truncated — matches the original's `content[:47] + "..."` convention
/// (47 kept chars + 3-char ellipsis = 50).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_has_no_id() {
        let m = Message::plain(Role::User, "hello");
        assert!(m.msg_id.is_none());
        assert!(!m.is_prunable());
    }

    #[test]
    fn derive_summary_uses_first_user_message() {
        let mut s = Session::new("s1");
        s.messages.push(Message::plain(Role::System, "sys"));
        s.messages
            .push(Message::plain(Role::User, "what kernel am I running?"));
        assert_eq!(s.derive_summary(), "what kernel am I running?");
    }

    #[test]
    fn derive_summary_truncates_long_messages() {
        let mut s = Session::new("s1");
        let long = "a".repeat(80);
        s.messages.push(Message::plain(Role::User, long));
        let summary = s.derive_summary();
        assert_eq!(summary.chars().count(), 50);
        assert!(summary.ends_with("..."));
    }
}
