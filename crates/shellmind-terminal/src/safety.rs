//! Decides whether a shell command may run without user confirmation.
//!
//! A command is safe only if every sub-command in the chain/pipe/subshell,
//! including any nested `$(...)`/backtick substitutions, is a member of the
//! allow-list, and no output is redirected to a file. Fails closed: any
//! parse error or unrecognised construct is treated as unsafe.

use std::collections::HashSet;

/// Shell operators that start a new command.
const CHAIN_OPERATORS: &[&str] = &["&&", "||", ";", "|", "|&", "&"];

/// Prefixes that don't change the safety of the command they wrap.
/// `sudo`, `doas`, `nohup` are deliberately excluded — they change the
/// execution context and must not be treated as transparent.
const BENIGN_PREFIXES: &[&str] = &[
    "time", "timeout", "nice", "ionice", "env", "stdbuf", "chrt", "taskset",
];

/// Output-redirection operators that write to a file unless the target is
/// `/dev/null` or another file descriptor.
const OUTPUT_REDIRECT_OPERATORS: &[&str] = &[">", ">>", "&>", "&>>"];

/// All redirection operators, used when skipping a redirection's target.
const ALL_REDIRECT_OPERATORS: &[&str] = &[">", ">>", "<", "<<", "<<<", "&>", "&>>", ">&", "<&"];

/// Default read-only commands that can be auto-approved regardless of
/// arguments. `sed`, `awk`, and `find` are deliberately excluded — each can
/// mutate files under certain flags.
pub fn default_safe_commands() -> HashSet<String> {
    [
        // listing / info
        "ls", "dir", "tree", "file", "stat", "readlink",
        // reading
        "cat", "head", "tail", "less", "more", "bat", "batcat",
        // searching
        "grep", "egrep", "fgrep", "rg", "ag", "ack",
        // non-mutating text processing
        "wc", "sort", "uniq", "cut", "tr", "rev", "tac", "fold", "column", "nl", "expand",
        "unexpand", "fmt", "paste", "join",
        // comparison
        "diff", "comm", "cmp",
        // checksums
        "md5sum", "sha256sum", "sha1sum", "sha512sum", "cksum", "b2sum",
        // binary inspection
        "xxd", "od", "hexdump", "strings",
        // lookup
        "which", "whereis", "whatis", "type", "command",
        // system info
        "uname", "hostname", "uptime", "date", "cal", "whoami", "id", "groups", "who", "w",
        "last", "df", "du", "free", "ps", "pgrep", "pidof", "lsblk", "lscpu", "lsmem", "lsusb",
        "lspci", "lsmod", "lsof", "ip", "ifconfig", "ss", "netstat", "route", "env", "printenv",
        "nproc", "getconf", "arch",
        // path utilities
        "pwd", "realpath", "dirname", "basename",
        // output
        "echo", "printf",
        // help
        "man", "info", "help",
        // conditionals
        "true", "false", "test", "[",
        // json/yaml
        "jq", "yq",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Returns `true` only if every sub-command in `command` is in
/// `safe_commands` and no output is redirected to a file.
pub fn is_command_safe(command: &str, safe_commands: &HashSet<String>) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return true;
    }
    check_safety(trimmed, safe_commands).unwrap_or(false)
}

fn check_safety(command: &str, safe_commands: &HashSet<String>) -> Option<bool> {
    for inner in extract_command_substitutions(command) {
        if !check_safety(&inner, safe_commands)? {
            return Some(false);
        }
    }

    let tokens = tokenize(command)?;
    if tokens.is_empty() {
        return Some(true);
    }

    if has_unsafe_redirections(&tokens) {
        return Some(false);
    }

    let commands = extract_command_names(&tokens);
    if commands.is_empty() {
        // Nothing identifiable — could be a complex construct we don't
        // understand. Fail closed.
        return Some(false);
    }

    for cmd in &commands {
        let base = cmd.rsplit('/').next().unwrap_or(cmd);
        if !safe_commands.contains(base) {
            return Some(false);
        }
    }

    Some(true)
}

/// Shell-aware lexer: quoting is respected, and runs of punctuation
/// characters (`&&`, `>>`, `|&`, …) are grouped into single tokens.
fn tokenize(command: &str) -> Option<Vec<String>> {
    const PUNCTUATION: &str = "|&;<>()";
    let mut tokens = Vec::new();
    let mut chars = command.chars().peekable();
    let mut current = String::new();

    fn flush(current: &mut String, tokens: &mut Vec<String>) {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    }

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                flush(&mut current, &mut tokens);
                chars.next();
            }
            '\'' => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        break;
                    }
                    if c == '\\' {
                        if let Some(next) = chars.next() {
                            current.push(next);
                        }
                    } else {
                        current.push(c);
                    }
                }
            }
            c if PUNCTUATION.contains(c) => {
                flush(&mut current, &mut tokens);
                let mut op = String::new();
                while let Some(&c) = chars.peek() {
                    if PUNCTUATION.contains(c) {
                        op.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(op);
            }
            _ => {
                current.push(c);
                chars.next();
            }
        }
    }
    flush(&mut current, &mut tokens);
    Some(tokens)
}

fn has_unsafe_redirections(tokens: &[String]) -> bool {
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();

        if token == ">(" {
            return true;
        }

        if OUTPUT_REDIRECT_OPERATORS.contains(&token) {
            if let Some(next) = tokens.get(i + 1) {
                if next == "/dev/null" {
                    i += 2;
                    continue;
                }
                if token == ">" && next.starts_with('&') && next[1..].chars().all(|c| c.is_ascii_digit()) {
                    i += 2;
                    continue;
                }
            }
            return true;
        }

        if token == ">&" {
            if let Some(next) = tokens.get(i + 1) {
                if next.chars().all(|c| c.is_ascii_digit()) || next == "/dev/null" {
                    i += 2;
                    continue;
                }
            }
            return true;
        }

        if is_numeric_fd_redirect(token) {
            if let Some(next) = tokens.get(i + 1) {
                if next == "/dev/null" {
                    i += 2;
                    continue;
                }
            }
            return true;
        }

        i += 1;
    }
    false
}

fn is_numeric_fd_redirect(token: &str) -> bool {
    let trimmed = token.trim_end_matches('>');
    !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_digit())
        && token.len() > trimmed.len()
        && token[trimmed.len()..].chars().all(|c| c == '>')
        && token.len() - trimmed.len() <= 2
}

fn is_redirection(token: &str) -> bool {
    if ALL_REDIRECT_OPERATORS.contains(&token) || matches!(token, ">&" | "<&" | ">|" | ">(") {
        return true;
    }
    is_numeric_fd_redirect_generic(token)
}

fn is_numeric_fd_redirect_generic(token: &str) -> bool {
    let digits_end = token.find(|c: char| !c.is_ascii_digit()).unwrap_or(token.len());
    if digits_end == 0 {
        return false;
    }
    let rest = &token[digits_end..];
    !rest.is_empty() && rest.len() <= 2 && rest.chars().all(|c| c == '<' || c == '>')
}

fn is_command_starter(token: &str) -> bool {
    CHAIN_OPERATORS.contains(&token) || token == "("
}

fn is_env_assignment(token: &str) -> bool {
    let Some(eq) = token.find('=') else { return false };
    let (name, _) = token.split_at(eq);
    !name.is_empty()
        && name.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn extract_command_names(tokens: &[String]) -> Vec<String> {
    let mut commands = Vec::new();
    let mut expect_command = true;
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();

        if is_command_starter(token) {
            expect_command = true;
            i += 1;
            continue;
        }

        if token == ")" {
            i += 1;
            continue;
        }

        if expect_command {
            while i < tokens.len() && BENIGN_PREFIXES.contains(&tokens[i].as_str()) {
                i += 1;
            }
            while i < tokens.len() && is_env_assignment(&tokens[i]) {
                i += 1;
            }
            if i < tokens.len() {
                let t = tokens[i].as_str();
                if !is_command_starter(t) && t != ")" && !is_redirection(t) {
                    commands.push(t.to_string());
                    expect_command = false;
                }
            }
            i += 1;
            continue;
        }

        if is_redirection(token) {
            i += 2;
            continue;
        }

        i += 1;
    }

    commands
}

/// Extracts inner commands from `$(...)` (nesting-aware) and `` `...` ``
/// (single level), skipping anything inside single quotes.
fn extract_command_substitutions(command: &str) -> Vec<String> {
    let mut results = extract_dollar_parens(command);

    let bytes: Vec<char> = command.chars().collect();
    let mut i = 0;
    let mut quote_parity = 0usize;
    let mut start: Option<usize> = None;
    while i < bytes.len() {
        match bytes[i] {
            '\'' => quote_parity += 1,
            '`' if quote_parity % 2 == 0 => {
                if let Some(s) = start {
                    let inner: String = bytes[s + 1..i].iter().collect();
                    results.push(inner);
                    start = None;
                } else {
                    start = Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    results
}

fn extract_dollar_parens(command: &str) -> Vec<String> {
    let mut results = Vec::new();
    let chars: Vec<char> = command.chars().collect();
    let mut i = 0;
    let mut in_single_quote = false;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' && !in_single_quote {
            in_single_quote = true;
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                i += 1;
            }
            i += 1;
            continue;
        }
        if c == '\'' && in_single_quote {
            in_single_quote = false;
            i += 1;
            continue;
        }

        if !in_single_quote && i + 1 < chars.len() && chars[i] == '$' && chars[i + 1] == '(' {
            let mut depth = 1;
            let start = i + 2;
            let mut j = start;
            let mut sq = false;
            let mut dq = false;
            while j < chars.len() && depth > 0 {
                let ch = chars[j];
                if ch == '\'' && !dq {
                    sq = !sq;
                } else if ch == '"' && !sq {
                    dq = !dq;
                } else if !sq && !dq {
                    if ch == '(' {
                        depth += 1;
                    } else if ch == ')' {
                        depth -= 1;
                    }
                }
                j += 1;
            }
            if depth == 0 {
                results.push(chars[start..j - 1].iter().collect());
            }
            i = j;
            continue;
        }

        i += 1;
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safe_set() -> HashSet<String> {
        default_safe_commands()
    }

    #[test]
    fn simple_read_only_command_is_safe() {
        assert!(is_command_safe("ls -la ~", &safe_set()));
    }

    #[test]
    fn rm_requires_confirmation() {
        assert!(!is_command_safe("rm -rf /tmp/x", &safe_set()));
    }

    #[test]
    fn pipe_of_safe_commands_is_safe() {
        assert!(is_command_safe("cat file.txt | grep foo | wc -l", &safe_set()));
    }

    #[test]
    fn pipe_with_one_unsafe_command_is_unsafe() {
        assert!(!is_command_safe("cat file.txt | tee out.txt", &safe_set()));
    }

    #[test]
    fn redirect_to_dev_null_is_safe() {
        assert!(is_command_safe("ls -la > /dev/null 2>&1", &safe_set()));
    }

    #[test]
    fn redirect_to_file_is_unsafe() {
        assert!(!is_command_safe("echo hi > out.txt", &safe_set()));
    }

    #[test]
    fn fd_to_fd_redirect_is_safe() {
        assert!(is_command_safe("ls 2>&1", &safe_set()));
    }

    #[test]
    fn command_substitution_is_checked_recursively() {
        assert!(!is_command_safe("echo $(rm -rf /)", &safe_set()));
        assert!(is_command_safe("echo $(whoami)", &safe_set()));
    }

    #[test]
    fn backtick_substitution_is_checked() {
        assert!(!is_command_safe("echo `rm -rf /`", &safe_set()));
    }

    #[test]
    fn sudo_prefix_is_never_benign() {
        assert!(!is_command_safe("sudo cat /etc/shadow", &safe_set()));
    }

    #[test]
    fn benign_prefix_is_skipped() {
        assert!(is_command_safe("timeout 5 ls -la", &safe_set()));
    }

    #[test]
    fn env_assignment_is_skipped_before_command() {
        assert!(is_command_safe("FOO=bar ls", &safe_set()));
    }

    #[test]
    fn process_substitution_output_is_unsafe() {
        assert!(!is_command_safe("diff <(ls) >(cat)", &safe_set()));
    }

    #[test]
    fn full_path_command_is_resolved_by_basename() {
        assert!(is_command_safe("/bin/ls -la", &safe_set()));
    }

    #[test]
    fn empty_command_is_safe() {
        assert!(is_command_safe("", &safe_set()));
    }
}
