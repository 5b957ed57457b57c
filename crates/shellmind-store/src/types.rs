//! Listing types returned by the Conversation Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a saved/recent conversation listing — cheap to build without
/// deserialising every message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// File stem for a saved conversation; session id for a recent one.
    pub name: String,
    pub last_used: DateTime<Utc>,
    pub summary: String,
    pub message_count: usize,
}
