//! Benchmark configuration.
//!
//! A [`BenchConfig`] is built once at process start (defaults, then `BENCH_*`
//! environment variables, then CLI flags) and passed by reference to the
//! coordinator and the agent registry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::runner::agents::MockProfile;
use crate::storage::RetryPolicy;

/// Which adapter implementation drives an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Any CLI agent; metrics come from JSON lines on stdout.
    Command,
    /// Claude Code in `stream-json` mode.
    ClaudeCode,
    /// Aider in non-interactive message-file mode.
    Aider,
    /// Simulated agent for offline runs.
    Mock,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Command => "command",
            AgentKind::ClaudeCode => "claude_code",
            AgentKind::Aider => "aider",
            AgentKind::Mock => "mock",
        }
    }

    /// Executable used when the settings do not name one.
    pub fn default_command(&self) -> Option<&'static str> {
        match self {
            AgentKind::ClaudeCode => Some("claude"),
            AgentKind::Aider => Some("aider"),
            AgentKind::Command | AgentKind::Mock => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" | "generic" | "cli" => Ok(AgentKind::Command),
            "claude_code" | "claude-code" | "claude" => Ok(AgentKind::ClaudeCode),
            "aider" => Ok(AgentKind::Aider),
            "mock" => Ok(AgentKind::Mock),
            other => Err(format!("Unknown agent kind: {}", other)),
        }
    }
}

/// How a command agent receives its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    #[default]
    Stdin,
    /// Appended as the last argument.
    Argument,
}

/// Definition of one agent under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Extra environment for the agent process. A value of the form `$VAR`
    /// is read from the benchmark's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub prompt_mode: PromptMode,
    /// Simulated behaviour when the agent runs as a mock.
    #[serde(default)]
    pub mock: MockProfile,
}

impl AgentSettings {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            command: None,
            args: Vec::new(),
            model: None,
            env: BTreeMap::new(),
            prompt_mode: PromptMode::default(),
            mock: MockProfile::default(),
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_prompt_mode(mut self, mode: PromptMode) -> Self {
        self.prompt_mode = mode;
        self
    }

    pub fn with_mock(mut self, profile: MockProfile) -> Self {
        self.mock = profile;
        self
    }

    /// The executable to spawn, falling back to the kind's default.
    pub fn program(&self) -> Option<&str> {
        self.command.as_deref().or_else(|| self.kind.default_command())
    }

    /// Resolves `$VAR` references in [`AgentSettings::env`].
    pub fn resolved_env(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.env
            .iter()
            .map(|(key, value)| match value.strip_prefix('$') {
                Some(var) => std::env::var(var)
                    .map(|v| (key.clone(), v))
                    .map_err(|_| ConfigError::MissingEnvVar(var.to_string())),
                None => Ok((key.clone(), value.clone())),
            })
            .collect()
    }
}

/// Top-level agents file layout.
#[derive(Debug, Deserialize)]
struct AgentsFile {
    agents: Vec<AgentSettings>,
}

/// Agents known without any configuration.
pub fn builtin_agents() -> Vec<AgentSettings> {
    vec![
        AgentSettings::new("claude-code", AgentKind::ClaudeCode),
        AgentSettings::new("aider", AgentKind::Aider),
    ]
}

/// Configuration for a benchmark process.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    // Inputs and outputs
    /// Root of the task corpus.
    pub tasks_dir: PathBuf,
    /// SQLite results database.
    pub database_path: PathBuf,
    /// Parent directory for per-pairing workspaces.
    pub workspace_root: PathBuf,
    /// Keep workspaces after cleanup instead of deleting them.
    pub keep_workspaces: bool,

    // Execution settings
    /// Maximum number of pairings executing at once.
    pub max_concurrent: usize,
    /// Trials per (agent, task) pair.
    pub trials: u32,
    /// Extra time the coordinator allows past the task timeout before it
    /// abandons an adapter that failed to stop itself.
    pub timeout_grace: Duration,
    /// Overrides every task's own timeout when set.
    pub task_timeout_override: Option<Duration>,
    /// Time limit for the verifier's test and quality commands.
    pub verify_timeout: Duration,

    // Agents
    /// Run every agent through the mock adapter.
    pub mock_agents: bool,
    /// YAML file with agent definitions.
    pub agents_file: Option<PathBuf>,
    pub agents: Vec<AgentSettings>,

    // Persistence
    /// Write attempts per result row.
    pub persist_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards.
    pub persist_backoff: Duration,

    // Credentials passed through to agent processes
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("./tasks"),
            database_path: PathBuf::from("./agent-bench.db"),
            workspace_root: PathBuf::from("./workspaces"),
            keep_workspaces: false,

            max_concurrent: 4,
            trials: 1,
            timeout_grace: Duration::from_secs(10),
            task_timeout_override: None,
            verify_timeout: Duration::from_secs(300),

            mock_agents: false,
            agents_file: None,
            agents: builtin_agents(),

            persist_attempts: 3,
            persist_backoff: Duration::from_millis(100),

            anthropic_api_key: None,
            openai_api_key: None,
            openrouter_api_key: None,
        }
    }
}

impl BenchConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BENCH_TASKS_DIR`: task corpus root (default: ./tasks)
    /// - `BENCH_DATABASE`: SQLite database path (default: ./agent-bench.db)
    /// - `BENCH_WORKSPACE_ROOT`: workspace parent (default: ./workspaces)
    /// - `BENCH_MAX_CONCURRENT`: concurrent pairings (default: 4)
    /// - `BENCH_TRIALS`: trials per pair (default: 1)
    /// - `BENCH_TIMEOUT_GRACE_SECS`: coordinator grace period (default: 10)
    /// - `BENCH_TASK_TIMEOUT_SECS`: override for every task timeout
    /// - `BENCH_MOCK_AGENTS`: run all agents as mocks (default: false)
    /// - `BENCH_PERSIST_ATTEMPTS`: write attempts per row (default: 3)
    /// - `BENCH_PERSIST_BACKOFF_MS`: initial write backoff (default: 100)
    /// - `BENCH_KEEP_WORKSPACES`: keep workspaces after cleanup (default: false)
    /// - `BENCH_AGENTS_FILE`: YAML agent definitions merged over the built-ins
    /// - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `OPENROUTER_API_KEY`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// agents file cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BENCH_TASKS_DIR") {
            config.tasks_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BENCH_DATABASE") {
            config.database_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BENCH_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BENCH_MAX_CONCURRENT") {
            config.max_concurrent = parse_env_value(&val, "BENCH_MAX_CONCURRENT")?;
        }

        if let Ok(val) = std::env::var("BENCH_TRIALS") {
            config.trials = parse_env_value(&val, "BENCH_TRIALS")?;
        }

        if let Ok(val) = std::env::var("BENCH_TIMEOUT_GRACE_SECS") {
            let secs: u64 = parse_env_value(&val, "BENCH_TIMEOUT_GRACE_SECS")?;
            config.timeout_grace = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("BENCH_TASK_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "BENCH_TASK_TIMEOUT_SECS")?;
            config.task_timeout_override = Some(Duration::from_secs(secs));
        }

        if let Ok(val) = std::env::var("BENCH_MOCK_AGENTS") {
            config.mock_agents = parse_env_bool(&val, "BENCH_MOCK_AGENTS")?;
        }

        if let Ok(val) = std::env::var("BENCH_PERSIST_ATTEMPTS") {
            config.persist_attempts = parse_env_value(&val, "BENCH_PERSIST_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("BENCH_PERSIST_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "BENCH_PERSIST_BACKOFF_MS")?;
            config.persist_backoff = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("BENCH_KEEP_WORKSPACES") {
            config.keep_workspaces = parse_env_bool(&val, "BENCH_KEEP_WORKSPACES")?;
        }

        config.anthropic_api_key = non_empty_env("ANTHROPIC_API_KEY");
        config.openai_api_key = non_empty_env("OPENAI_API_KEY");
        config.openrouter_api_key = non_empty_env("OPENROUTER_API_KEY");

        if let Ok(val) = std::env::var("BENCH_AGENTS_FILE") {
            config = config.with_agents_file(PathBuf::from(val))?;
        }

        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }

        if self.trials == 0 {
            return Err(ConfigError::ValidationFailed(
                "trials must be greater than 0".to_string(),
            ));
        }

        if self.persist_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "persist_attempts must be greater than 0".to_string(),
            ));
        }

        if let Some(timeout) = self.task_timeout_override {
            if timeout.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "task timeout override must be greater than 0".to_string(),
                ));
            }
        }

        if self.verify_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "verify_timeout must be greater than 0".to_string(),
            ));
        }

        if self.agents.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one agent must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "agent name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "agent '{}' is defined more than once",
                    agent.name
                )));
            }
            if agent.kind == AgentKind::Command && agent.command.is_none() && !self.mock_agents {
                return Err(ConfigError::ValidationFailed(format!(
                    "agent '{}' of kind command needs a command",
                    agent.name
                )));
            }
        }

        Ok(())
    }

    /// Looks up an agent definition by name.
    pub fn agent(&self, name: &str) -> Option<&AgentSettings> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Effective timeout for a task.
    pub fn timeout_for(&self, task: &crate::task::Task) -> Duration {
        self.task_timeout_override.unwrap_or_else(|| task.timeout())
    }

    /// Retry policy for result writes.
    pub fn persist_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.persist_attempts,
            initial_backoff: self.persist_backoff,
        }
    }

    /// API keys exported into every agent process.
    pub fn api_env(&self) -> Vec<(String, String)> {
        [
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("OPENROUTER_API_KEY", &self.openrouter_api_key),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }

    /// Merges agent definitions from a YAML file. Entries replace built-ins
    /// of the same name.
    pub fn with_agents_file(mut self, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        for agent in load_agents_file(&path)? {
            self.upsert_agent(agent);
        }
        self.agents_file = Some(path);
        Ok(self)
    }

    /// Adds an agent, replacing any existing definition with the same name.
    pub fn upsert_agent(&mut self, agent: AgentSettings) {
        match self.agents.iter_mut().find(|a| a.name == agent.name) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    /// Builder method to add or replace an agent.
    pub fn with_agent(mut self, agent: AgentSettings) -> Self {
        self.upsert_agent(agent);
        self
    }

    /// Builder method to replace the agent list.
    pub fn with_agents(mut self, agents: Vec<AgentSettings>) -> Self {
        self.agents = agents;
        self
    }

    /// Builder method to set the tasks directory.
    pub fn with_tasks_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tasks_dir = path.into();
        self
    }

    /// Builder method to set the database path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Builder method to set the workspace root.
    pub fn with_workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_root = path.into();
        self
    }

    /// Builder method to keep or delete workspaces after cleanup.
    pub fn with_keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    /// Builder method to set the concurrency limit.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Builder method to set the number of trials.
    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// Builder method to set the coordinator grace period.
    pub fn with_timeout_grace(mut self, grace: Duration) -> Self {
        self.timeout_grace = grace;
        self
    }

    /// Builder method to override every task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_override = Some(timeout);
        self
    }

    /// Builder method to set the verifier time limit.
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Builder method to toggle mock agents.
    pub fn with_mock_agents(mut self, enabled: bool) -> Self {
        self.mock_agents = enabled;
        self
    }

    /// Builder method to set the persistence retry policy.
    pub fn with_persist_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.persist_attempts = attempts;
        self.persist_backoff = backoff;
        self
    }
}

/// Reads agent definitions from a YAML file.
pub fn load_agents_file(path: &Path) -> Result<Vec<AgentSettings>, ConfigError> {
    let content = fs::read_to_string(path)?;
    let file: AgentsFile = serde_yaml::from_str(&content)?;
    debug!(path = %path.display(), count = file.agents.len(), "Loaded agents file");
    Ok(file.agents)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.trials, 1);
        assert_eq!(config.timeout_grace, Duration::from_secs(10));
        assert!(config.task_timeout_override.is_none());
        assert!(!config.mock_agents);
        assert!(config.agent("claude-code").is_some());
        assert!(config.agent("aider").is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BenchConfig::new()
            .with_max_concurrent(8)
            .with_trials(3)
            .with_task_timeout(Duration::from_secs(60))
            .with_mock_agents(true)
            .with_database_path("/tmp/bench.db")
            .with_persist_retry(5, Duration::from_millis(10));

        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.trials, 3);
        assert_eq!(config.task_timeout_override, Some(Duration::from_secs(60)));
        assert!(config.mock_agents);
        assert_eq!(config.database_path, PathBuf::from("/tmp/bench.db"));
        assert_eq!(config.persist_policy().attempts, 5);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let result = BenchConfig::default().with_max_concurrent(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_concurrent"));
    }

    #[test]
    fn test_validation_rejects_zero_trials() {
        assert!(BenchConfig::default().with_trials(0).validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_agents() {
        let config = BenchConfig::default().with_agents(vec![
            AgentSettings::new("x", AgentKind::Mock),
            AgentSettings::new("x", AgentKind::Mock),
        ]);
        assert!(config.validate().unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validation_requires_command_for_command_agents() {
        let config = BenchConfig::default().with_agent(AgentSettings::new("custom", AgentKind::Command));
        assert!(config.validate().is_err());

        let config = config.with_agent(
            AgentSettings::new("custom", AgentKind::Command).with_command("./agent.sh"),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_agents_file_overrides_builtin() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agents.yaml");
        fs::write(
            &path,
            r#"
agents:
  - name: aider
    kind: aider
    model: gpt-4o
  - name: my-agent
    kind: command
    command: ./run-agent.sh
    args: ["--fast"]
    prompt_mode: argument
"#,
        )
        .unwrap();

        let config = BenchConfig::default().with_agents_file(&path).unwrap();
        assert_eq!(config.agents.len(), 3);
        assert_eq!(config.agent("aider").unwrap().model.as_deref(), Some("gpt-4o"));
        let custom = config.agent("my-agent").unwrap();
        assert_eq!(custom.program(), Some("./run-agent.sh"));
        assert_eq!(custom.prompt_mode, PromptMode::Argument);
        assert_eq!(config.agents_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_agents_file_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agents.yaml");
        fs::write(&path, "agents: [ {name: x, kind: rocket} ]").unwrap();
        assert!(matches!(
            BenchConfig::default().with_agents_file(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_resolved_env_missing_var() {
        let settings = AgentSettings::new("a", AgentKind::Mock)
            .with_env("PLAIN", "value")
            .with_env("KEY", "$AGENT_BENCH_TEST_SURELY_UNSET_VAR");
        let err = settings.resolved_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(v) if v == "AGENT_BENCH_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_agent_kind_from_str() {
        assert_eq!("claude-code".parse::<AgentKind>().unwrap(), AgentKind::ClaudeCode);
        assert_eq!("generic".parse::<AgentKind>().unwrap(), AgentKind::Command);
        assert!("rocket".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_parse_env_helpers() {
        assert_eq!(parse_env_value::<u32>("3", "K").unwrap(), 3);
        assert!(parse_env_value::<u32>("x", "K").is_err());
        assert!(parse_env_bool("yes", "K").unwrap());
        assert!(parse_env_bool("maybe", "K").is_err());
    }
}
