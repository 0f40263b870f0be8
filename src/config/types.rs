//! Configuration types, defaults, loading, and validation.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Home directory for opencoder state (`~/.opencoder`).
pub fn opencoder_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".opencoder")
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent behaviour configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool engine configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Context / memory manager configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Prompt manager configuration
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Agent behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reason-act iterations per user turn (default: 50)
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,

    /// Context window override in tokens. When unset, the compression
    /// provider's configured window is used.
    #[serde(default)]
    pub context_window: Option<u32>,

    /// Fraction of the context window at which compaction triggers (default: 0.9)
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,
}

fn default_max_loops() -> usize {
    50
}

fn default_compression_threshold() -> f64 {
    0.9
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            context_window: None,
            compression_threshold: default_compression_threshold(),
        }
    }
}

/// Tool engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Width of the global semaphore for concurrency-safe tools (default: 10)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Built-in tools exposed to the model (default: all)
    #[serde(default = "default_enabled_tools")]
    pub enabled_tools: Vec<String>,

    /// Per-tool timeout overrides in milliseconds
    #[serde(default)]
    pub timeouts: BTreeMap<String, u64>,
}

fn default_max_concurrency() -> usize {
    10
}

fn default_enabled_tools() -> Vec<String> {
    [
        "read",
        "write",
        "edit",
        "multi_edit",
        "glob",
        "grep",
        "ls",
        "bash",
        "todo_read",
        "todo_write",
        "web_search",
        "web_fetch",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            enabled_tools: default_enabled_tools(),
            timeouts: BTreeMap::new(),
        }
    }
}

/// Context / memory manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Messages retained after compaction (default: 6)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Root directory (document store) or database file (relational store)
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// "document-store" (one JSON file per session) or "relational-store" (SQLite)
    #[serde(default = "default_storage_type")]
    pub storage_type: String,

    /// Filename of the agent's store-wide persistent notes blob
    #[serde(default = "default_persistence_file")]
    pub persistence_file: String,
}

fn default_history_limit() -> usize {
    6
}

fn default_storage_path() -> PathBuf {
    opencoder_home().join("sessions")
}

fn default_storage_type() -> String {
    "document-store".to_string()
}

fn default_persistence_file() -> String {
    "agent-notes.md".to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            storage_path: default_storage_path(),
            storage_type: default_storage_type(),
            persistence_file: default_persistence_file(),
        }
    }
}

/// Prompt manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of `*.md` prompt templates
    #[serde(default = "default_prompts_directory")]
    pub directory: PathBuf,

    /// Watch the directory and reparse templates on change
    #[serde(default)]
    pub hot_reload: bool,
}

fn default_prompts_directory() -> PathBuf {
    opencoder_home().join("prompts")
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            directory: default_prompts_directory(),
            hot_reload: false,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used for chat turns: "openai", "deepseek", "openrouter", "anthropic"
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider used for history compaction. Unset = same as `default_provider`.
    #[serde(default)]
    pub compression_provider: Option<String>,

    /// Per-provider sub-sections, keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            compression_provider: None,
            providers: BTreeMap::new(),
        }
    }
}

/// Configuration for a single LLM provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat completions endpoint override (local servers, proxies)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Max output tokens per request
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Context window of the configured model
    #[serde(default)]
    pub context_window: Option<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file directory. Unset = stderr only.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from `~/.opencoder/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = opencoder_home().join("config.toml");
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration to `~/.opencoder/config.toml`.
    pub fn save(&self) -> Result<()> {
        let home = opencoder_home();
        fs::create_dir_all(&home)
            .with_context(|| format!("failed to create {}", home.display()))?;
        let raw = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(home.join("config.toml"), raw).context("failed to write config file")?;
        Ok(())
    }

    /// Startup validation. Any failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.agent.compression_threshold && self.agent.compression_threshold <= 1.0) {
            bail!(
                "agent.compression_threshold must be in (0, 1], got {}",
                self.agent.compression_threshold
            );
        }
        if self.tools.max_concurrency == 0 {
            bail!("tools.max_concurrency must be at least 1");
        }
        if self.context.history_limit == 0 {
            bail!("context.history_limit must be at least 1");
        }
        match self.context.storage_type.as_str() {
            "document-store" | "relational-store" => {}
            other => bail!(
                "context.storage_type must be \"document-store\" or \"relational-store\", got \"{}\"",
                other
            ),
        }
        Ok(())
    }

    /// Provider section for the configured default provider.
    pub fn default_provider_config(&self) -> ProviderConfig {
        self.llm
            .providers
            .get(&self.llm.default_provider)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.max_loops, 50);
        assert!((config.agent.compression_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.tools.max_concurrency, 10);
        assert_eq!(config.context.history_limit, 6);
        assert_eq!(config.context.storage_type, "document-store");
        assert!(config.tools.enabled_tools.contains(&"bash".to_string()));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [agent]
            max_loops = 3

            [tools]
            max_concurrency = 2
            enabled_tools = ["read", "bash"]

            [tools.timeouts]
            bash = 30000

            [llm]
            default_provider = "anthropic"

            [llm.providers.anthropic]
            api_key = "sk-test"
            model = "claude-sonnet-4"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.agent.max_loops, 3);
        assert_eq!(config.tools.enabled_tools, vec!["read", "bash"]);
        assert_eq!(config.tools.timeouts.get("bash"), Some(&30_000));
        assert_eq!(config.llm.default_provider, "anthropic");
        let provider = config.default_provider_config();
        assert_eq!(provider.model.as_deref(), Some("claude-sonnet-4"));
        // Untouched sections fall back to defaults
        assert_eq!(config.context.history_limit, 6);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.agent.compression_threshold = 0.0;
        assert!(config.validate().is_err());
        config.agent.compression_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_storage_type() {
        let mut config = Config::default();
        config.context.storage_type = "graph-store".to_string();
        assert!(config.validate().is_err());
    }
}
