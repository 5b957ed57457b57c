//! The Response Parser — `spec.md` §4.D.
//!
//! Extracts the single action block (if any) from a raw model reply and
//! classifies the reply's completion tag. Grounded on the regex grammar and
//! dispatch order in
//! `examples/original_source/src/ai_shell/app.py` (`_handle_ai_response`)
//! and the tag handling in `examples/original_source/src/ai_shell/chat.py`
//! (`parse_response_type`, `strip_response_tags_for_display`).

use regex::Regex;

/// One parsed action block, in the same priority order the teacher used
/// when more than one type of block could in principle appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ContextDistill { msg_id: Option<u64>, summary: Option<String> },
    ContextPrune { msg_ids: Vec<u64> },
    ContextUntruncate { msg_id: Option<u64> },
    Command(String),
    WebSearch(String),
}

/// Whether a reply ends in a tag the Turn Controller treats as a signal
/// that the task is done or is blocked on the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTag {
    Complete,
    Question,
    None,
}

/// The fully parsed shape of one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// The reply with all action fences removed and the trailing tag
    /// stripped — what gets shown to the user.
    pub display_text: String,
    pub tag: ReplyTag,
    /// `None` when the reply carried no action block and was plain text.
    /// `Some(Err(count))` when more than one action block was present,
    /// carrying the total number found (`spec.md` §4.D "multiple actions").
    pub action: Option<Result<Action, usize>>,
}

fn fence(kind: &str) -> Regex {
    Regex::new(&format!(r"(?s)```{kind}\s*(.*?)\s*```")).unwrap()
}

fn find_all<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
    re.captures_iter(text)
        .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or(""))
        .collect()
}

/// Parse a raw model reply into its display text, completion tag, and at
/// most one action. Dispatch priority, when multiple block *types* are
/// present but each appears only once, still counts every block found —
/// a reply is only single-action when exactly one block total matched.
pub fn parse(reply: &str) -> ParsedReply {
    let command_re = fence("command");
    let websearch_re = fence("websearch");
    let distill_re = fence("context_distill");
    let prune_re = fence("context_prune");
    let untruncate_re = fence("context_untruncate");

    let commands = find_all(&command_re, reply);
    let websearches = find_all(&websearch_re, reply);
    let distills = find_all(&distill_re, reply);
    let prunes = find_all(&prune_re, reply);
    let untruncates = find_all(&untruncate_re, reply);

    let total =
        commands.len() + websearches.len() + distills.len() + prunes.len() + untruncates.len();

    let tag = classify_tag(reply);
    let display_text = strip_for_display(reply, &[&distill_re, &prune_re, &untruncate_re, &command_re, &websearch_re]);

    let action = if total > 1 {
        Some(Err(total))
    } else if let Some(block) = distills.first() {
        let (msg_id, summary) = parse_context_distill(block);
        Some(Ok(Action::ContextDistill { msg_id, summary }))
    } else if let Some(block) = prunes.first() {
        Some(Ok(Action::ContextPrune {
            msg_ids: parse_context_prune(block),
        }))
    } else if let Some(block) = untruncates.first() {
        Some(Ok(Action::ContextUntruncate {
            msg_id: parse_context_untruncate(block),
        }))
    } else if let Some(block) = commands.first() {
        let cmd = block.trim().to_string();
        if cmd.is_empty() {
            None
        } else {
            Some(Ok(Action::Command(cmd)))
        }
    } else if let Some(block) = websearches.first() {
        let query = block.trim().to_string();
        if query.is_empty() {
            None
        } else {
            Some(Ok(Action::WebSearch(query)))
        }
    } else {
        None
    };

    ParsedReply {
        display_text,
        tag,
        action,
    }
}

fn classify_tag(reply: &str) -> ReplyTag {
    let lower = reply.to_lowercase();
    let trimmed = lower.trim_end();
    if trimmed.ends_with("[question]") {
        ReplyTag::Question
    } else if trimmed.ends_with("[complete]") {
        ReplyTag::Complete
    } else {
        ReplyTag::None
    }
}

/// Strip every action fence plus the trailing `[QUESTION]`/`[COMPLETE]`
/// tag, producing the text a user should actually read.
fn strip_for_display(reply: &str, fences: &[&Regex]) -> String {
    let mut text = reply.to_string();
    for re in fences {
        text = re.replace_all(&text, "").to_string();
    }

    let trimmed_end = text.trim_end().to_string();
    let lower = trimmed_end.to_lowercase();
    let stripped = if lower.ends_with("[question]") || lower.ends_with("[complete]") {
        trimmed_end[..trimmed_end.len() - "[question]".len()].trim_end()
    } else {
        trimmed_end.trim_end()
    };

    stripped.trim().to_string()
}

/// Parse a `context_distill` block body: `id: <n>` then `summary: <text>`
/// (summary may continue on following lines until the block ends).
fn parse_context_distill(block: &str) -> (Option<u64>, Option<String>) {
    let mut msg_id = None;
    let mut summary_lines: Vec<String> = Vec::new();
    let mut in_summary = false;

    for line in block.trim().lines() {
        let stripped = line.trim();
        let lower = stripped.to_lowercase();
        if lower.starts_with("id:") && !in_summary {
            if let Some((_, rest)) = stripped.split_once(':') {
                msg_id = rest.trim().parse().ok();
            }
        } else if lower.starts_with("summary:") {
            if let Some((_, rest)) = stripped.split_once(':') {
                summary_lines.push(rest.trim().to_string());
            }
            in_summary = true;
        } else if in_summary {
            summary_lines.push(line.trim_end().to_string());
        }
    }

    let summary = summary_lines.join("\n").trim().to_string();
    (msg_id, if summary.is_empty() { None } else { Some(summary) })
}

/// Parse a `context_prune` block body: `ids: <n1>, <n2>, ...` or a single
/// `id: <n>`.
fn parse_context_prune(block: &str) -> Vec<u64> {
    for line in block.trim().lines() {
        let stripped = line.trim();
        let lower = stripped.to_lowercase();
        if let Some(rest) = lower.strip_prefix("ids:") {
            let start = stripped.len() - rest.len();
            let ids_str = stripped[start..].trim();
            let mut out = Vec::new();
            for part in ids_str.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.parse() {
                    Ok(id) => out.push(id),
                    Err(_) => return Vec::new(),
                }
            }
            return out;
        }
        if let Some(rest) = lower.strip_prefix("id:") {
            let start = stripped.len() - rest.len();
            return stripped[start..]
                .trim()
                .parse()
                .map(|id| vec![id])
                .unwrap_or_default();
        }
    }
    Vec::new()
}

/// Parse a `context_untruncate` block body: `id: <n>`.
fn parse_context_untruncate(block: &str) -> Option<u64> {
    for line in block.trim().lines() {
        let stripped = line.trim();
        let lower = stripped.to_lowercase();
        if let Some(rest) = lower.strip_prefix("id:") {
            let start = stripped.len() - rest.len();
            return stripped[start..].trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_command_block() {
        let reply = "I'll check the kernel version.\n```command\nuname -r\n```\n[COMPLETE]";
        let parsed = parse(reply);
        assert_eq!(parsed.tag, ReplyTag::Complete);
        assert_eq!(parsed.action, Some(Ok(Action::Command("uname -r".to_string()))));
        assert!(!parsed.display_text.contains("```"));
        assert!(!parsed.display_text.to_lowercase().contains("[complete]"));
    }

    #[test]
    fn parses_websearch_block() {
        let reply = "Let me look that up.\n```websearch\nlatest rust release\n```";
        let parsed = parse(reply);
        assert_eq!(
            parsed.action,
            Some(Ok(Action::WebSearch("latest rust release".to_string())))
        );
        assert_eq!(parsed.tag, ReplyTag::None);
    }

    #[test]
    fn flags_multiple_actions() {
        let reply = "```command\nls\n```\n```websearch\nfoo\n```";
        let parsed = parse(reply);
        assert_eq!(parsed.action, Some(Err(2)));
    }

    #[test]
    fn parses_context_distill_block() {
        let reply = "Summarizing.\n```context_distill\nid: 3\nsummary: installed nginx\n```";
        let parsed = parse(reply);
        assert_eq!(
            parsed.action,
            Some(Ok(Action::ContextDistill {
                msg_id: Some(3),
                summary: Some("installed nginx".to_string())
            }))
        );
    }

    #[test]
    fn parses_context_prune_multi_id() {
        let reply = "```context_prune\nids: 1, 2, 5\n```";
        let parsed = parse(reply);
        assert_eq!(
            parsed.action,
            Some(Ok(Action::ContextPrune { msg_ids: vec![1, 2, 5] }))
        );
    }

    #[test]
    fn question_tag_detected_case_insensitively() {
        let parsed = parse("Which directory? [Question]");
        assert_eq!(parsed.tag, ReplyTag::Question);
        assert_eq!(parsed.display_text, "Which directory?");
    }

    #[test]
    fn plain_text_reply_has_no_action() {
        let parsed = parse("Nothing to do here.");
        assert_eq!(parsed.action, None);
        assert_eq!(parsed.tag, ReplyTag::None);
    }

    #[test]
    fn empty_command_block_yields_no_action() {
        let parsed = parse("```command\n\n```");
        assert_eq!(parsed.action, None);
    }
}
