//! Prompt Manager
//!
//! Maintains named text templates loaded from `*.md` files in a configured
//! directory (the file stem is the prompt name). Templates use minijinja
//! syntax. With hot reload enabled, a filesystem watcher reparses changed
//! files for the lifetime of the manager.

mod defaults;

pub use defaults::DEFAULT_PROMPTS;

use crate::config::PromptsConfig;
use minijinja::{Environment, UndefinedBehavior};
use notify::{RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt not found: {0}")]
    NotFound(String),

    #[error("failed to render prompt '{name}': {message}")]
    Render { name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher error: {0}")]
    Watch(String),
}

pub type Result<T> = std::result::Result<T, PromptError>;

/// Template sources plus the compiled environment built from them. The
/// environment is rebuilt on every mutation; renders only take a read lock.
struct PromptState {
    sources: HashMap<String, String>,
    env: Environment<'static>,
}

impl PromptState {
    fn from_sources(sources: HashMap<String, String>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (name, source) in &sources {
            // Sources are validated before insertion, so this cannot fail
            // for entries loaded through the manager.
            if let Err(e) = env.add_template_owned(name.clone(), source.clone()) {
                tracing::warn!("skipping prompt '{}': {}", name, e);
            }
        }
        Self { sources, env }
    }
}

/// Loads, renders and hot-reloads named prompt templates.
pub struct PromptManager {
    directory: PathBuf,
    state: Arc<RwLock<PromptState>>,
    watcher_shutdown: CancellationToken,
}

impl PromptManager {
    /// Create a manager over `config.directory`. Missing directory is
    /// created and seeded with the built-in default templates. With
    /// `hot_reload` a watcher task observes the directory until the
    /// manager is dropped.
    pub fn new(config: &PromptsConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory)?;
        Self::materialize_defaults(&config.directory)?;

        let sources = Self::load_sources(&config.directory);
        let manager = Self {
            directory: config.directory.clone(),
            state: Arc::new(RwLock::new(PromptState::from_sources(sources))),
            watcher_shutdown: CancellationToken::new(),
        };

        if config.hot_reload {
            manager.spawn_watcher()?;
        }

        Ok(manager)
    }

    /// Write the built-in templates for any prompt that has no file yet.
    fn materialize_defaults(directory: &Path) -> Result<()> {
        for (name, source) in DEFAULT_PROMPTS {
            let path = directory.join(format!("{name}.md"));
            if !path.exists() {
                std::fs::write(&path, source)?;
                tracing::info!("materialized default prompt {}", path.display());
            }
        }
        Ok(())
    }

    /// Read every `*.md` file under `directory`. Files that fail to parse
    /// as templates are omitted and logged; they never abort the load.
    fn load_sources(directory: &Path) -> HashMap<String, String> {
        let mut sources = HashMap::new();
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot read prompt directory {}: {}", directory.display(), e);
                return sources;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(source) => match Self::validate_template(name, &source) {
                    Ok(()) => {
                        sources.insert(name.to_string(), source);
                    }
                    Err(e) => {
                        tracing::warn!("prompt '{}' failed to parse, omitting: {}", name, e);
                    }
                },
                Err(e) => tracing::warn!("cannot read prompt {}: {}", path.display(), e),
            }
        }
        sources
    }

    /// Parse a template source in a scratch environment without touching
    /// the live table.
    fn validate_template(name: &str, source: &str) -> std::result::Result<(), minijinja::Error> {
        let mut scratch = Environment::new();
        scratch.add_template_owned(name.to_string(), source.to_string())?;
        Ok(())
    }

    /// Render a prompt with no variables.
    pub fn get(&self, name: &str) -> Result<String> {
        self.get_with_data(name, serde_json::Value::Object(Default::default()))
    }

    /// Render a prompt with the given variable bindings.
    pub fn get_with_data(&self, name: &str, data: serde_json::Value) -> Result<String> {
        let state = self.state.read().expect("prompt state lock poisoned");
        let template = state
            .env
            .get_template(name)
            .map_err(|_| PromptError::NotFound(name.to_string()))?;
        template.render(&data).map_err(|e| PromptError::Render {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Names of all loaded prompts.
    pub fn names(&self) -> Vec<String> {
        let state = self.state.read().expect("prompt state lock poisoned");
        let mut names: Vec<String> = state.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rebuild the whole template table from disk atomically.
    pub fn reload(&self) -> Result<()> {
        let sources = Self::load_sources(&self.directory);
        let mut state = self.state.write().expect("prompt state lock poisoned");
        *state = PromptState::from_sources(sources);
        tracing::info!("reloaded {} prompt templates", state.sources.len());
        Ok(())
    }

    /// Reparse or remove a single prompt after a filesystem event. A parse
    /// failure keeps the previous template.
    fn reload_file(state: &Arc<RwLock<PromptState>>, path: &Path) {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            return;
        };

        let mut guard = state.write().expect("prompt state lock poisoned");
        if !path.exists() {
            if guard.sources.remove(&name).is_some() {
                tracing::info!("prompt '{}' removed", name);
                *guard = PromptState::from_sources(std::mem::take(&mut guard.sources));
            }
            return;
        }

        match std::fs::read_to_string(path) {
            Ok(source) => match Self::validate_template(&name, &source) {
                Ok(()) => {
                    guard.sources.insert(name.clone(), source);
                    *guard = PromptState::from_sources(std::mem::take(&mut guard.sources));
                    tracing::info!("prompt '{}' reloaded", name);
                }
                Err(e) => {
                    tracing::warn!("prompt '{}' failed to reparse, keeping previous: {}", name, e);
                }
            },
            Err(e) => tracing::warn!("cannot read changed prompt {}: {}", path.display(), e),
        }
    }

    /// Spawn the watcher task. The task owns the notify handle and runs
    /// until the shutdown token fires.
    fn spawn_watcher(&self) -> Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<notify::Event>(32);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        })
        .map_err(|e| PromptError::Watch(e.to_string()))?;

        watcher
            .watch(&self.directory, RecursiveMode::NonRecursive)
            .map_err(|e| PromptError::Watch(e.to_string()))?;

        let state = Arc::clone(&self.state);
        let shutdown = self.watcher_shutdown.clone();
        tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the task.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if !matches!(
                            event.kind,
                            notify::EventKind::Create(_)
                                | notify::EventKind::Modify(_)
                                | notify::EventKind::Remove(_)
                        ) {
                            continue;
                        }
                        for path in &event.paths {
                            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                                Self::reload_file(&state, path);
                            }
                        }
                    }
                }
            }
            tracing::debug!("prompt watcher stopped");
        });

        Ok(())
    }
}

impl Drop for PromptManager {
    fn drop(&mut self) {
        self.watcher_shutdown.cancel();
    }
}
