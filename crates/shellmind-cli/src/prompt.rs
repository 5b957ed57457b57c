//! Composes the system prompt handed to the model as the first message of
//! a session. Base text and tool-block documentation are taken verbatim
//! from `examples/original_source/src/ai_shell/chat.py`'s
//! `_get_system_prompt`; the web-search section is included only when
//! `web_search.enabled` and a search model is configured. The companion
//! `context.txt` file and any `[prompt]` config sections are appended
//! afterward.

use shellmind_core::Config;

const WEB_SEARCH_SECTION: &str = r#"

WEB SEARCH CAPABILITY:
You have access to a web search tool. This is NOT a traditional keyword-based search engine like Google — it is an AI-powered search model that understands natural language. You should ask it full, detailed questions rather than short keyword queries. Be as specific as needed — the search model will understand context and nuance.

Use web search blocks like this:

```websearch
your full question here
```

Use web search when you need to:
- Find current information about software, libraries, or technologies
- Look up documentation, tutorials, or guides
- Get answers to questions that require current knowledge
- Find solutions to specific error messages or problems
- Research best practices or current recommendations

IMPORTANT: Like commands, use ONLY ONE web search block per response."#;

const CONTEXT_MANAGEMENT_SECTION: &str = r#"

CONTEXT MANAGEMENT:
You MUST actively manage your conversation context. After every command execution or search result, evaluate whether the output needs to be distilled or pruned before continuing with the next step. Do not let outputs accumulate.

Available tools:

1. context_distill - Condense a message to a short summary. Preferred for almost all context management.
```context_distill
id: <message_id>
summary: <thorough summary with all key data>
```

2. context_prune - Remove messages entirely. Use only for messages that are completely irrelevant noise or superseded duplicates.
```context_prune
ids: <id1>, <id2>, ...
```

3. context_untruncate - Reveal the full content of an auto-truncated message.
```context_untruncate
id: <message_id>
```

Rules:
- The <prunable-messages> list below shows manageable messages with IDs and token sizes.
- Messages marked (truncated) have hidden content — use context_untruncate if needed.
- Messages marked (already distilled) are already condensed.
- Context management uses the same one-block-per-response rule as commands and searches."#;

const BASE_PROMPT: &str = r#"
You are a Linux terminal assistant Agent. You can provide explanations and execute commands naturally.

COMMAND FORMAT: When you need to run a command, use command blocks like this:

```command
ls -la /home
```

RESPONSE TYPE TAGS: You must include one of these tags at the END of your response to indicate its type:
- [QUESTION] - When your response asks a question that requires user input, choice, or clarification
- [COMPLETE] - When you have provided a complete summary and think the task is fully done
- No tag - When you want to continue with more actions or await command results

RULES:
1. Use ```command blocks ONLY for commands you want executed
2. Use ```websearch blocks ONLY for web searches when you need current information
3. Use ```context_distill, ```context_prune, or ```context_untruncate blocks for managing conversation context
4. CRITICAL: Use ONLY ONE command, search, OR context management block per response - NEVER multiple
5. Always explain what the command or search will do
6. Execute commands/searches one at a time and analyze results before continuing
7. ALWAYS end your response with the appropriate tag: [QUESTION], [COMPLETE], or no tag

INFORMATION GATHERING:
- NEVER assume system details - discover them with commands
- When you need current information not available locally, USE WEB SEARCH
- When multiple approaches exist and choice matters, ASK THE USER

The host OS is Linux - use appropriate Linux commands only."#;

pub fn build_system_prompt(config: &Config, context_file: &str) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if config.web_search.enabled && config.web_search.model.is_some() {
        prompt.push_str(WEB_SEARCH_SECTION);
    }
    prompt.push_str(CONTEXT_MANAGEMENT_SECTION);

    for section in config.prompt.sections.values() {
        if !section.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(section);
        }
    }

    if !context_file.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(context_file);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellmind_core::config::{ApiConfig, WebSearchConfig};

    fn base_config() -> Config {
        Config {
            api: ApiConfig {
                url: "https://api.example.com".to_string(),
                api_key: "key".to_string(),
            },
            models: Default::default(),
            incognito: Default::default(),
            web_search: WebSearchConfig::default(),
            settings: Default::default(),
            conversations: Default::default(),
            prompt: Default::default(),
            theme: Default::default(),
        }
    }

    #[test]
    fn omits_web_search_section_when_disabled() {
        let prompt = build_system_prompt(&base_config(), "");
        assert!(!prompt.contains("WEB SEARCH CAPABILITY"));
        assert!(prompt.contains("CONTEXT MANAGEMENT"));
    }

    #[test]
    fn includes_web_search_section_when_configured() {
        let mut config = base_config();
        config.web_search.enabled = true;
        config.web_search.model = Some("perplexity/sonar-pro".to_string());
        let prompt = build_system_prompt(&config, "");
        assert!(prompt.contains("WEB SEARCH CAPABILITY"));
    }

    #[test]
    fn appends_context_file_verbatim() {
        let prompt = build_system_prompt(&base_config(), "Always prefer zsh syntax.");
        assert!(prompt.trim_end().ends_with("Always prefer zsh syntax."));
    }
}
