//! The Context Manager — `spec.md` §4.C.
//!
//! Assigns stable ids to tool-result messages, tracks their state, and
//! implements the compaction operations the model itself can invoke
//! (`distill`, `prune`, `untruncate`) plus the automatic head-tail
//! truncation applied to oversized tool output before it is ever shown to
//! the model.
//!
//! Resolved byte-for-byte against
//! `examples/original_source/src/ai_shell/context_manager.py`.

use regex::Regex;

use shellmind_core::{Message, MessageState, Role};

use crate::error::{AgentError, Result};

/// `spec.md` §4.C default truncation thresholds.
pub const DEFAULT_TRUNCATE_THRESHOLD: usize = 10_000;
pub const DEFAULT_HEAD_LINES: usize = 50;
pub const DEFAULT_TAIL_LINES: usize = 50;

pub struct ContextManager {
    next_id: u64,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextManager {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Reset the id counter — used when the conversation is cleared.
    pub fn reset(&mut self) {
        self.next_id = 1;
    }

    /// Allocate the next `msg_id` and mark `message` as prunable. `label`,
    /// if not supplied, is derived from `message.content` by pattern
    /// matching.
    pub fn assign(&mut self, message: &mut Message, label: Option<String>) {
        message.msg_id = Some(self.next_id);
        self.next_id += 1;
        message.state = MessageState::Normal;
        message.original_content = None;
        message.label = Some(label.unwrap_or_else(|| derive_label(&message.content)));
    }

    /// Deterministic cheap token estimate: character count / 4.
    pub fn estimate_tokens(&self, content: &str) -> usize {
        content.chars().count() / 4
    }

    fn total_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_tokens(&m.content)).sum()
    }

    /// Build the `<prunable-messages>` block appended to a copy of the
    /// system prompt at call time.
    pub fn build_prunable_list(&self, messages: &[Message]) -> String {
        let mut lines = Vec::new();
        for m in messages {
            let Some(id) = m.msg_id else { continue };
            if m.state == MessageState::Pruned {
                continue;
            }
            let label = m.label.as_deref().unwrap_or("System message");
            let tokens = self.estimate_tokens(&m.content);
            let state_info = match m.state {
                MessageState::Truncated => " (truncated)",
                MessageState::Distilled => " (already distilled)",
                _ => "",
            };
            lines.push(format!("{id}: {label}{state_info} (~{tokens} tokens)"));
        }

        if lines.is_empty() {
            return String::new();
        }

        let total = self.total_tokens(messages);
        format!(
            "<prunable-messages>\nTotal estimated context: ~{total} tokens\n{}\n</prunable-messages>",
            lines.join("\n")
        )
    }

    /// Strip all metadata fields, returning role/content-only records ready
    /// for the wire.
    pub fn prepare_for_api(&self, messages: &[Message]) -> Vec<crate::client::ApiMessage> {
        messages.iter().map(crate::client::ApiMessage::from).collect()
    }

    /// If `content` is over `threshold` chars and has more than
    /// `head_lines + tail_lines` lines, keep the first `head_lines` and
    /// last `tail_lines` lines with an explicit omission marker between
    /// them. Otherwise return the content unchanged.
    pub fn auto_truncate(&self, content: &str) -> (String, bool, Option<String>) {
        self.auto_truncate_with(
            content,
            DEFAULT_TRUNCATE_THRESHOLD,
            DEFAULT_HEAD_LINES,
            DEFAULT_TAIL_LINES,
        )
    }

    pub fn auto_truncate_with(
        &self,
        content: &str,
        threshold: usize,
        head_lines: usize,
        tail_lines: usize,
    ) -> (String, bool, Option<String>) {
        if content.len() <= threshold {
            return (content.to_string(), false, None);
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let total_lines = lines.len();
        if total_lines <= head_lines + tail_lines {
            return (content.to_string(), false, None);
        }

        let head = lines[..head_lines].join("\n");
        let tail = lines[total_lines - tail_lines..].join("\n");
        let omitted = total_lines - head_lines - tail_lines;

        let truncated = format!(
            "{head}\n\n... [{omitted} lines omitted - use context_untruncate to view full output] ...\n\n{tail}"
        );
        (truncated, true, Some(content.to_string()))
    }

    /// Apply `auto_truncate` to `content` and update `message` in place
    /// so that its visible body is the truncated text while
    /// `original_content` keeps the full output.
    pub fn ingest_tool_result(&mut self, message: &mut Message, label: Option<String>) {
        self.assign(message, label);
        let (visible, was_truncated, original) = self.auto_truncate(&message.content);
        if was_truncated {
            message.content = visible;
            message.state = MessageState::Truncated;
            message.original_content = original;
        }
    }

    /// Prune every message in `ids` whose state is not already pruned.
    pub fn prune(&self, messages: &mut [Message], ids: &[u64]) -> Result<Vec<u64>> {
        let mut pruned = Vec::new();
        for m in messages.iter_mut() {
            let Some(id) = m.msg_id else { continue };
            if !ids.contains(&id) {
                continue;
            }
            if m.state == MessageState::Pruned {
                continue;
            }
            let label = m.label.clone().unwrap_or_else(|| "System message".to_string());
            if m.original_content.is_none() {
                m.original_content = Some(m.content.clone());
            }
            m.content = format!("[PRUNED] {label}");
            m.state = MessageState::Pruned;
            pruned.push(id);
        }
        if pruned.is_empty() && !ids.is_empty() {
            return Err(AgentError::ContextOp(format!(
                "no prunable message matched ids {ids:?}"
            )));
        }
        Ok(pruned)
    }

    /// Replace `id`'s body with the model-supplied summary. Fails when the
    /// message is already pruned, or does not exist.
    pub fn distill(&self, messages: &mut [Message], id: u64, summary: &str) -> Result<()> {
        let Some(m) = messages.iter_mut().find(|m| m.msg_id == Some(id)) else {
            return Err(AgentError::ContextOp(format!("no message with id {id}")));
        };
        if m.state == MessageState::Pruned {
            return Err(AgentError::ContextOp(format!(
                "message {id} is already pruned and cannot be distilled"
            )));
        }
        let label = m.label.clone().unwrap_or_else(|| "System message".to_string());
        if m.original_content.is_none() {
            m.original_content = Some(m.content.clone());
        }
        m.content = format!("[DISTILLED] {label}\nSummary: {summary}");
        m.state = MessageState::Distilled;
        Ok(())
    }

    /// Restore `id`'s original body. Only valid when `state == Truncated`.
    pub fn untruncate(&self, messages: &mut [Message], id: u64) -> Result<()> {
        let Some(m) = messages.iter_mut().find(|m| m.msg_id == Some(id)) else {
            return Err(AgentError::ContextOp(format!("no message with id {id}")));
        };
        if m.state != MessageState::Truncated {
            return Err(AgentError::ContextOp(format!(
                "message {id} is not truncated"
            )));
        }
        let Some(original) = m.original_content.take() else {
            return Err(AgentError::ContextOp(format!(
                "message {id} has no stored original content"
            )));
        };
        m.content = original;
        m.state = MessageState::Normal;
        Ok(())
    }

    /// After loading a saved session, set the next-id counter to
    /// `max(existing msg_ids) + 1`.
    pub fn restore_ids(&mut self, messages: &[Message]) {
        let max_id = messages.iter().filter_map(|m| m.msg_id).max().unwrap_or(0);
        self.next_id = max_id + 1;
    }

    /// `/compact`: shrink the `Output:` section of every tool-result message
    /// still carrying a `SYSTEM MESSAGE:` body down to 500 chars, leaving
    /// everything else (labels, ids, state) untouched. Unlike `prune` and
    /// `distill`, this is a blunt user-triggered cleanup rather than a
    /// model-invoked operation, so it needs no id list and cannot fail.
    /// Returns the number of messages actually shortened.
    pub fn compact_payload(&self, messages: &mut [Message]) -> usize {
        let mut compacted = 0;
        for m in messages.iter_mut() {
            if m.role != Role::User || !m.content.contains("SYSTEM MESSAGE:") {
                continue;
            }
            let shortened = truncate_system_message_output(&m.content, COMPACT_MAX_OUTPUT_LENGTH);
            if shortened.len() < m.content.len() {
                m.content = shortened;
                compacted += 1;
            }
        }
        compacted
    }
}

/// `/compact` caps each `Output:` section at 500 characters.
const COMPACT_MAX_OUTPUT_LENGTH: usize = 500;

/// Find the first `Output:` section in `content` — the run of lines up to
/// the next `Success:`/`Command output:` marker or blank line — and, if it
/// is longer than `max_length`, cut it down, preferring to break on the
/// last newline inside the cut when that point falls past 70% of
/// `max_length` so a truncated line is never half-printed.
fn truncate_system_message_output(content: &str, max_length: usize) -> String {
    const MARKER: &str = "Output:";
    const TERMINATORS: [&str; 3] = ["\nSuccess:", "\nCommand output:", "\n\n"];

    let Some(marker_at) = content.find(MARKER) else {
        return content.to_string();
    };
    let before = &content[..marker_at + MARKER.len()];
    let after = &content[marker_at + MARKER.len()..];

    let section_end = TERMINATORS
        .iter()
        .filter_map(|t| after.find(t))
        .min()
        .unwrap_or(after.len());
    let section = &after[..section_end];
    let rest = &after[section_end..];

    let chars: Vec<char> = section.chars().collect();
    if chars.len() <= max_length {
        return content.to_string();
    }

    let window: String = chars[..max_length].iter().collect();
    let cutoff = window
        .rfind('\n')
        .filter(|&nl| nl as f64 >= max_length as f64 * 0.7)
        .unwrap_or(window.len());

    format!(
        "{before}{}\n... [truncated by /compact command]{rest}",
        &window[..cutoff]
    )
}

/// Derive a short human-readable label from the content of a tool-result
/// message. First matching category wins, falling back to a truncated
/// content preview.
///
/// The label patterns are only ever evaluated once per tool result, so
/// each regex is compiled on demand rather than cached in a static.
fn derive_label(content: &str) -> String {
    if content.is_empty() {
        return "System message".to_string();
    }

    let cmd_re = Regex::new(r"(?m)^Command executed:\s*(.+?)\s*$").unwrap();
    let search_re = Regex::new(r"(?m)^Web search executed for:\s*(.+?)\s*$").unwrap();
    let decline_re = Regex::new(r"(?m)^User declined to run the command:\s*(.+?)\s*$").unwrap();

    if let Some(caps) = cmd_re.captures(content) {
        return format!("Command output: {}", clip(&caps[1], 60));
    }
    if let Some(caps) = search_re.captures(content) {
        return format!("Web search: {}", clip(&caps[1], 60));
    }
    if let Some(caps) = decline_re.captures(content) {
        return format!("User declined: {}", clip(&caps[1], 50));
    }
    if content.contains("Task completed") {
        return "Task completion".to_string();
    }
    if content.contains("Task failed") || content.contains("task status check failed") {
        return "Task failure".to_string();
    }
    let lower = content.to_lowercase();
    if lower.contains("empty response") {
        return "Empty response handling".to_string();
    }
    if lower.contains("not yet complete") {
        return "Task continuation".to_string();
    }
    if lower.contains("multiple") && (lower.contains("commands") || lower.contains("actions")) {
        return "Multiple actions error".to_string();
    }
    if content.contains("Web search failed") {
        let search_failed_re = Regex::new(r"(?m)failed for query:\s*(.+?)\s*$").unwrap();
        if let Some(caps) = search_failed_re.captures(content) {
            return format!("Web search failed: {}", clip(&caps[1], 50));
        }
        return "Web search failed".to_string();
    }
    if content.contains("Context management") {
        return "Context management confirmation".to_string();
    }

    let preview: String = content.chars().take(50).collect();
    format!("System message: {}", preview.replace('\n', " ").trim())
}

fn clip(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellmind_core::Role;

    fn tool_result(content: &str) -> Message {
        Message::plain(Role::User, content)
    }

    #[test]
    fn assign_gives_monotonic_ids() {
        let mut cm = ContextManager::new();
        let mut a = tool_result("SYSTEM MESSAGE: Command executed: ls\nfoo");
        let mut b = tool_result("SYSTEM MESSAGE: Command executed: pwd\n/tmp");
        cm.assign(&mut a, None);
        cm.assign(&mut b, None);
        assert_eq!(a.msg_id, Some(1));
        assert_eq!(b.msg_id, Some(2));
        assert_eq!(a.label.as_deref(), Some("Command output: ls"));
    }

    #[test]
    fn distill_then_prune_then_untruncate_fails() {
        let mut cm = ContextManager::new();
        let mut messages = vec![tool_result("SYSTEM MESSAGE: Command executed: apt install nginx\nOK")];
        cm.assign(&mut messages[0], None);
        let id = messages[0].msg_id.unwrap();

        cm.distill(&mut messages, id, "installed nginx 1.24.0").unwrap();
        assert_eq!(messages[0].state, MessageState::Distilled);
        assert!(messages[0].content.starts_with("[DISTILLED] "));
        assert!(messages[0].content.contains("installed nginx 1.24.0"));

        cm.prune(&mut messages, &[id]).unwrap();
        assert_eq!(messages[0].state, MessageState::Pruned);
        assert!(messages[0].content.starts_with("[PRUNED] "));

        let err = cm.untruncate(&mut messages, id);
        assert!(err.is_err());
    }

    #[test]
    fn auto_truncate_keeps_head_and_tail() {
        let cm = ContextManager::new();
        let lines: Vec<String> = (0..300).map(|i| format!("line {i}")).collect();
        let content = lines.join("\n");
        assert!(content.len() > DEFAULT_TRUNCATE_THRESHOLD);

        let (visible, was_truncated, original) = cm.auto_truncate(&content);
        assert!(was_truncated);
        assert!(visible.len() < content.len());
        assert!(visible.starts_with("line 0\n"));
        assert!(visible.contains("... [200 lines omitted - use context_untruncate to view full output] ..."));
        assert!(visible.trim_end().ends_with("line 299"));
        assert_eq!(original.as_deref(), Some(content.as_str()));
    }

    #[test]
    fn untruncate_restores_exact_original() {
        let mut cm = ContextManager::new();
        let lines: Vec<String> = (0..300).map(|i| format!("line {i}")).collect();
        let content = lines.join("\n");
        let mut messages = vec![tool_result(&content)];
        cm.ingest_tool_result(&mut messages[0], None);
        let id = messages[0].msg_id.unwrap();
        assert_eq!(messages[0].state, MessageState::Truncated);

        cm.untruncate(&mut messages, id).unwrap();
        assert_eq!(messages[0].state, MessageState::Normal);
        assert_eq!(messages[0].content, content);
    }

    #[test]
    fn restore_ids_continues_after_max_existing_id() {
        let mut cm = ContextManager::new();
        let mut messages = vec![tool_result("a"), tool_result("b")];
        messages[0].msg_id = Some(3);
        messages[1].msg_id = Some(7);
        cm.restore_ids(&messages);
        let mut fresh = tool_result("c");
        cm.assign(&mut fresh, None);
        assert_eq!(fresh.msg_id, Some(8));
    }

    #[test]
    fn compact_payload_shortens_long_output_sections() {
        let cm = ContextManager::new();
        let long_output = (0..100).map(|i| format!("output line {i}")).collect::<Vec<_>>().join("\n");
        let content = format!("SYSTEM MESSAGE: Command executed: find /\nOutput:\n{long_output}\nSuccess: true");
        let mut messages = vec![tool_result(&content)];

        let compacted = cm.compact_payload(&mut messages);
        assert_eq!(compacted, 1);
        assert!(messages[0].content.contains("... [truncated by /compact command]"));
        assert!(messages[0].content.ends_with("\nSuccess: true"));
        assert!(messages[0].content.len() < content.len());
    }

    #[test]
    fn compact_payload_leaves_short_outputs_untouched() {
        let cm = ContextManager::new();
        let content = "SYSTEM MESSAGE: Command executed: pwd\nOutput:\n/home/user\nSuccess: true".to_string();
        let mut messages = vec![tool_result(&content)];

        let compacted = cm.compact_payload(&mut messages);
        assert_eq!(compacted, 0);
        assert_eq!(messages[0].content, content);
    }

    #[test]
    fn compact_payload_ignores_non_tool_messages() {
        let cm = ContextManager::new();
        let mut messages = vec![Message::plain(Role::Assistant, "no system message here at all")];
        let compacted = cm.compact_payload(&mut messages);
        assert_eq!(compacted, 0);
    }

    #[test]
    fn prunable_list_formats_header_and_entries() {
        let mut cm = ContextManager::new();
        let mut messages = vec![tool_result("SYSTEM MESSAGE: Command executed: whoami\nroot")];
        cm.assign(&mut messages[0], None);
        let block = cm.build_prunable_list(&messages);
        assert!(block.starts_with("<prunable-messages>\nTotal estimated context:"));
        assert!(block.contains("1: Command output: whoami"));
        assert!(block.ends_with("</prunable-messages>"));
    }
}
