//! Aider adapter.
//!
//! Aider runs non-interactively with `--message-file`. It reports usage as
//! plain text after every LLM call:
//!
//! ```text
//! Tokens: 2.3k sent, 512 received. Cost: $0.01 message, $0.03 session.
//! Applied edit to quicksort.py
//! ```

use std::fs;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use super::command::ProcessAgent;
use super::{AdapterError, AgentAdapter};
use crate::config::AgentSettings;
use crate::runner::process::probe_version;
use crate::runner::result::{BenchmarkResult, TokenUsage};
use crate::runner::workspace::Workspace;
use crate::task::Task;

/// Prompt file written into the workspace. Dotfiles are not counted as
/// generated output.
const MESSAGE_FILE: &str = ".agent-bench-message.md";

fn tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"Tokens:\s*([\d.,]+[kKmM]?)\s*sent,\s*([\d.,]+[kKmM]?)\s*received\.(?:\s*Cost:\s*\$([\d.]+)\s*message,\s*\$([\d.]+)\s*session)?",
        )
        .expect("Invalid regex for aider token lines")
    })
}

/// Metrics extracted from an aider transcript.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AiderSummary {
    pub tokens: TokenUsage,
    /// Last reported session cost, else the sum of message costs.
    pub cost: f64,
    pub edits: u32,
    pub retries: u32,
}

/// Parses a token count such as `512`, `2.3k` or `1,024`.
pub fn parse_token_count(raw: &str) -> Option<u64> {
    let cleaned = raw.replace(',', "");
    let (number, multiplier) = match cleaned.chars().last()? {
        'k' | 'K' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'm' | 'M' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = number.parse().ok()?;
    Some((value * multiplier).round() as u64)
}

/// Parses aider's stdout.
pub fn parse_transcript(stdout: &str) -> AiderSummary {
    let mut summary = AiderSummary::default();
    let mut message_cost = 0.0;
    let mut session_cost: Option<f64> = None;

    for line in stdout.lines() {
        if let Some(caps) = tokens_re().captures(line) {
            let sent = caps.get(1).and_then(|m| parse_token_count(m.as_str())).unwrap_or(0);
            let received = caps.get(2).and_then(|m| parse_token_count(m.as_str())).unwrap_or(0);
            summary.tokens.add(TokenUsage::new(sent, received));
            if let Some(cost) = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()) {
                message_cost += cost;
            }
            if let Some(cost) = caps.get(4).and_then(|m| m.as_str().parse::<f64>().ok()) {
                session_cost = Some(cost);
            }
        } else if line.starts_with("Applied edit to ") {
            summary.edits = summary.edits.saturating_add(1);
        } else if line.contains("did not conform to the edit format")
            || line.starts_with("Retrying in ")
        {
            summary.retries = summary.retries.saturating_add(1);
        }
    }

    summary.cost = session_cost.unwrap_or(message_cost);
    summary
}

/// Adapter for Aider.
pub struct AiderAdapter {
    inner: ProcessAgent,
}

impl AiderAdapter {
    pub fn new(settings: AgentSettings, api_env: Vec<(String, String)>) -> Self {
        Self {
            inner: ProcessAgent::new(settings, api_env),
        }
    }

    fn args(&self) -> Vec<String> {
        let settings = &self.inner.settings;
        let mut args = vec![
            "--yes-always".to_string(),
            "--no-git".to_string(),
            "--no-pretty".to_string(),
            "--no-stream".to_string(),
            "--message-file".to_string(),
            MESSAGE_FILE.to_string(),
        ];
        if let Some(model) = &settings.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(settings.args.iter().cloned());
        args
    }
}

#[async_trait]
impl AgentAdapter for AiderAdapter {
    fn name(&self) -> &str {
        &self.inner.settings.name
    }

    async fn version(&self) -> Option<String> {
        probe_version(self.inner.program()).await
    }

    async fn setup(&mut self, workspace: &Workspace, _task: &Task) -> Result<(), AdapterError> {
        self.inner.setup(workspace)
    }

    async fn execute_task(&mut self, prompt: &str, timeout: Duration) -> BenchmarkResult {
        let Some(spec) = self.inner.spec(self.args()) else {
            return self.inner.not_set_up();
        };

        let message_path = spec.cwd.join(MESSAGE_FILE);
        if let Err(e) = fs::write(&message_path, prompt) {
            return BenchmarkResult::failure(0.0, format!("failed to write message file: {}", e));
        }

        info!(agent = %self.name(), "Starting aider");
        let output = match self.inner.run(spec, timeout).await {
            Ok(output) => output,
            Err(failed) => return failed,
        };

        let summary = parse_transcript(&output.stdout);
        debug!(
            agent = %self.name(),
            edits = summary.edits,
            retries = summary.retries,
            cost = summary.cost,
            "Aider finished"
        );

        let result = if output.timed_out {
            BenchmarkResult::timeout(timeout)
        } else if output.success() {
            BenchmarkResult::success(output.wall_time)
        } else {
            BenchmarkResult::failure(output.wall_time, output.failure_reason())
        };

        let recovered = result.success && summary.retries > 0;
        result
            .with_tokens(summary.tokens)
            .with_cost(summary.cost)
            .with_retries(summary.retries)
            .with_tool_calls(summary.edits)
            .with_error_recovered(recovered)
            .with_generated_files(self.inner.generated_files())
            .with_logs(output.transcript())
    }

    async fn cleanup(&mut self) -> Result<(), AdapterError> {
        if let Some(workspace) = &self.inner.workspace {
            let message_path = workspace.path.join(MESSAGE_FILE);
            if message_path.exists() {
                if let Err(e) = fs::remove_file(&message_path) {
                    warn!(path = %message_path.display(), error = %e, "Failed to remove message file");
                }
            }
        }
        self.inner.cleanup();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentKind;

    #[test]
    fn test_parse_token_count() {
        assert_eq!(parse_token_count("512"), Some(512));
        assert_eq!(parse_token_count("2.3k"), Some(2300));
        assert_eq!(parse_token_count("1,024"), Some(1024));
        assert_eq!(parse_token_count("1.5M"), Some(1_500_000));
        assert_eq!(parse_token_count("abc"), None);
    }

    #[test]
    fn test_parse_transcript() {
        let stdout = "\
Aider v0.50.0
Tokens: 2.3k sent, 512 received. Cost: $0.01 message, $0.01 session.
Applied edit to quicksort.py
The LLM did not conform to the edit format.
Tokens: 3.1k sent, 200 received. Cost: $0.02 message, $0.03 session.
Applied edit to quicksort.py
Applied edit to test_quicksort.py
";
        let summary = parse_transcript(stdout);
        assert_eq!(summary.tokens, TokenUsage::new(5400, 712));
        assert!((summary.cost - 0.03).abs() < 1e-12);
        assert_eq!(summary.edits, 3);
        assert_eq!(summary.retries, 1);
    }

    #[test]
    fn test_parse_transcript_without_costs() {
        let summary = parse_transcript("Tokens: 100 sent, 50 received.\n");
        assert_eq!(summary.tokens, TokenUsage::new(100, 50));
        assert_eq!(summary.cost, 0.0);
    }

    #[test]
    fn test_args() {
        let adapter = AiderAdapter::new(AgentSettings::new("aider", AgentKind::Aider), Vec::new());
        let args = adapter.args();
        assert!(args.contains(&"--yes-always".to_string()));
        assert!(args.windows(2).any(|w| w == ["--message-file", MESSAGE_FILE]));
    }
}
