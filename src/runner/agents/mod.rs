//! Agent adapters for different AI coding agents.
//!
//! Each adapter knows how to:
//! 1. Prepare a workspace for its agent
//! 2. Launch the agent with a prompt under a time limit
//! 3. Turn the agent's own output protocol into a [`BenchmarkResult`]
//!
//! Adapters are created through an [`AgentRegistry`], one fresh instance per
//! pairing.

pub mod aider;
pub mod claude_code;
pub mod command;
pub mod mock;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::result::BenchmarkResult;
use super::workspace::{Workspace, WorkspaceError};
use crate::config::{AgentKind, AgentSettings, BenchConfig};
use crate::error::ConfigError;
use crate::task::Task;

pub use aider::AiderAdapter;
pub use claude_code::ClaudeCodeAdapter;
pub use command::CommandAdapter;
pub use mock::{MockAdapter, MockProfile};

/// Infrastructure failures of an adapter.
///
/// These abort a single pairing. Anything the agent itself does wrong is a
/// failed [`BenchmarkResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Uniform lifecycle for driving one agent through one task.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Agent name as configured.
    fn name(&self) -> &str;

    /// Version of the agent tool, when it can be determined.
    async fn version(&self) -> Option<String>;

    /// Prepares the adapter for `task` in `workspace`.
    async fn setup(&mut self, workspace: &Workspace, task: &Task) -> Result<(), AdapterError>;

    /// Runs the agent. Never fails: timeouts and agent errors are reported
    /// as unsuccessful results.
    async fn execute_task(&mut self, prompt: &str, timeout: Duration) -> BenchmarkResult;

    /// Releases anything acquired in `setup`.
    async fn cleanup(&mut self) -> Result<(), AdapterError>;
}

/// Builds a fresh adapter.
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn AgentAdapter> + Send + Sync>;

/// Agent name to adapter factory.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every configured agent. With `mock_agents` set, each agent
    /// is backed by a [`MockAdapter`] using its mock profile.
    pub fn from_config(config: &BenchConfig) -> Self {
        let mut registry = Self::new();
        let api_env = config.api_env();

        for settings in &config.agents {
            let settings = settings.clone();
            let kind = if config.mock_agents {
                AgentKind::Mock
            } else {
                settings.kind
            };
            let api_env = api_env.clone();
            let name = settings.name.clone();

            let factory: AdapterFactory = match kind {
                AgentKind::Command => Arc::new(move || {
                    Box::new(CommandAdapter::new(settings.clone(), api_env.clone())) as Box<dyn AgentAdapter>
                }),
                AgentKind::ClaudeCode => Arc::new(move || {
                    Box::new(ClaudeCodeAdapter::new(settings.clone(), api_env.clone())) as Box<dyn AgentAdapter>
                }),
                AgentKind::Aider => Arc::new(move || {
                    Box::new(AiderAdapter::new(settings.clone(), api_env.clone())) as Box<dyn AgentAdapter>
                }),
                AgentKind::Mock => Arc::new(move || {
                    Box::new(MockAdapter::new(settings.name.clone(), settings.mock.clone()))
                        as Box<dyn AgentAdapter>
                }),
            };
            registry.register(name, factory);
        }

        registry
    }

    /// Registers (or replaces) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Convenience for registering a closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn AgentAdapter> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Builds a fresh adapter for `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn AgentAdapter>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownAgent(name.to_string()))
    }

    /// Checks requested names. An empty request selects every agent.
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<String>, ConfigError> {
        if requested.is_empty() {
            return Ok(self.names());
        }
        let mut names = Vec::with_capacity(requested.len());
        for name in requested {
            if !self.contains(name) {
                return Err(ConfigError::UnknownAgent(name.clone()));
            }
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

/// Settings shared by the process-backed adapters.
pub(crate) fn process_env(
    settings: &AgentSettings,
    api_env: &[(String, String)],
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut env = api_env.to_vec();
    env.extend(settings.resolved_env()?);
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSettings;

    fn mock_config() -> BenchConfig {
        BenchConfig::default().with_agents(vec![
            AgentSettings::new("agentX", AgentKind::Mock),
            AgentSettings::new("agentY", AgentKind::Mock),
        ])
    }

    #[test]
    fn test_registry_from_config() {
        let registry = AgentRegistry::from_config(&mock_config());
        assert_eq!(registry.names(), vec!["agentX", "agentY"]);
        let adapter = registry.create("agentX").unwrap();
        assert_eq!(adapter.name(), "agentX");
    }

    #[test]
    fn test_unknown_agent() {
        let registry = AgentRegistry::from_config(&mock_config());
        assert!(matches!(
            registry.create("gpt-pilot"),
            Err(ConfigError::UnknownAgent(name)) if name == "gpt-pilot"
        ));
        assert!(registry.resolve(&["agentX".to_string(), "nope".to_string()]).is_err());
    }

    #[test]
    fn test_resolve_defaults_to_all_and_dedups() {
        let registry = AgentRegistry::from_config(&mock_config());
        assert_eq!(registry.resolve(&[]).unwrap().len(), 2);
        assert_eq!(
            registry
                .resolve(&["agentY".to_string(), "agentY".to_string()])
                .unwrap(),
            vec!["agentY"]
        );
    }

    #[test]
    fn test_mock_toggle_overrides_kind() {
        let config = BenchConfig::default().with_mock_agents(true);
        let registry = AgentRegistry::from_config(&config);
        let adapter = registry.create("claude-code").unwrap();
        assert_eq!(adapter.name(), "claude-code");
    }

    #[test]
    fn test_process_env_merges_api_keys() {
        let settings = AgentSettings::new("a", AgentKind::Command).with_env("MODE", "fast");
        let env = process_env(&settings, &[("OPENAI_API_KEY".to_string(), "sk".to_string())]).unwrap();
        assert_eq!(env.len(), 2);
        assert!(env.contains(&("MODE".to_string(), "fast".to_string())));
    }
}
