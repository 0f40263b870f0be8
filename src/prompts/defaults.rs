//! Built-in prompt templates.
//!
//! Materialized into the prompt directory on first run so a fresh install
//! works without any bundled assets. Users edit the files afterwards; the
//! constants here are only the seed.

pub const SYSTEM_PROMPT: &str = r#"You are an expert software engineering assistant powered by {{ model_provider }}.

You help the user by reading, writing and modifying files, running shell
commands, and searching the workspace through the tools available to you.

Guidelines:
- Read files before editing them. Never guess at file contents.
- Prefer small, targeted edits over whole-file rewrites.
- When a task needs several steps, execute them one at a time and verify
  intermediate results with the available tools.
- Report failures honestly; if a command or edit fails, show the error and
  try a different approach instead of repeating the same call.
- Keep answers concise. The user is a developer working in a terminal.
"#;

pub const USER_INFO_PROMPT: &str = r#"Environment information:

- OS: {{ os }}
- Working directory: {{ pwd }}
- Shell: {{ shell }}
- Date: {{ date }}

Workspace layout:
{{ file_structure }}
"#;

pub const COMPRESSION_PROMPT: &str = r#"The conversation below must be compressed to continue within the model's
context budget. Write a summary of at most {{ token_limit }} tokens that
preserves everything needed to carry on the work:

- the user's goal and the current task
- decisions made and constraints discovered
- files created, modified or discussed, with what changed
- errors encountered and how they were resolved
- the next step that was about to happen

Conversation:
{{ conversation_history }}
"#;

/// (name, source) pairs for the templates every installation needs.
pub const DEFAULT_PROMPTS: &[(&str, &str)] = &[
    ("system", SYSTEM_PROMPT),
    ("user_info", USER_INFO_PROMPT),
    ("compression", COMPRESSION_PROMPT),
];
