//! Post-execution verification of a pairing's workspace.
//!
//! The verifier runs the task's external test command and quality probe in
//! the workspace and checks that expected outputs exist. It never fails: an
//! unavailable harness is reported as `None` so scoring can treat it as
//! undefined rather than as zero.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::process::{run_process, ProcessSpec};
use super::result::{TestCounts, VerificationOutcome};
use super::workspace::join_inside;
use crate::task::Task;

fn count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+)\s+(passed|failed|errors?|total)\b")
            .expect("Invalid regex for test summaries")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("Invalid regex for numbers"))
}

/// JSON summary a harness may print instead of a text summary.
#[derive(Debug, Deserialize)]
struct JsonCounts {
    passed: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    total: Option<u32>,
}

/// Extracts test counts from harness output.
///
/// Understands pytest (`3 passed, 1 failed`), cargo test
/// (`test result: ok. 5 passed; 0 failed`, summed over binaries), jest
/// (`Tests: 1 failed, 4 passed, 5 total`) and a JSON line
/// `{"passed": 3, "failed": 1}`. Returns `None` when nothing matches.
pub fn parse_test_counts(output: &str) -> Option<TestCounts> {
    for line in output.lines().rev() {
        let line = line.trim();
        if line.starts_with('{') {
            if let Ok(json) = serde_json::from_str::<JsonCounts>(line) {
                let total = json.total.unwrap_or(json.passed + json.failed);
                return Some(TestCounts {
                    total: total.max(json.passed + json.failed),
                    passed: json.passed,
                    failed: json.failed,
                });
            }
        }
    }

    let mut passed = 0u32;
    let mut failed = 0u32;
    let mut total: Option<u32> = None;
    let mut matched = false;

    for line in output.lines() {
        if !count_re().is_match(line) {
            continue;
        }
        let is_cargo = line.contains("test result:");

        let mut line_passed = 0;
        let mut line_failed = 0;
        let mut line_total: Option<u32> = None;
        for caps in count_re().captures_iter(line) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match caps[2].to_lowercase().as_str() {
                "passed" => line_passed += n,
                "failed" | "error" | "errors" => line_failed += n,
                "total" => line_total = Some(line_total.unwrap_or(0) + n),
                _ => {}
            }
        }

        matched = true;
        if is_cargo {
            passed += line_passed;
            failed += line_failed;
        } else {
            // pytest and jest print a single final summary; the last one wins.
            passed = line_passed;
            failed = line_failed;
            total = line_total;
        }
    }

    if !matched {
        return None;
    }

    let counted = passed + failed;
    Some(TestCounts {
        total: total.map(|t| t.max(counted)).unwrap_or(counted),
        passed,
        failed,
    })
}

/// Extracts a 0-100 quality score: the last number the probe printed.
pub fn parse_quality_score(output: &str) -> Option<f64> {
    number_re()
        .find_iter(output)
        .last()
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
}

/// Runs the verification steps for a task.
#[derive(Debug, Clone)]
pub struct Verifier {
    timeout: Duration,
}

impl Verifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Verifies the workspace after the agent finished.
    pub async fn verify(&self, task: &Task, workspace: &Path) -> VerificationOutcome {
        let missing_outputs = missing_outputs(task, workspace);

        let tests = match &task.test_command {
            Some(cmd) => self.run_tests(cmd, workspace).await,
            None => None,
        };

        let code_quality = match &task.quality_command {
            Some(cmd) => self.run_quality(cmd, workspace).await,
            None => None,
        };

        info!(
            task = %task.name,
            tests = ?tests,
            code_quality = ?code_quality,
            missing = missing_outputs.len(),
            "Verification complete"
        );

        VerificationOutcome {
            tests,
            code_quality,
            missing_outputs,
        }
    }

    async fn run_tests(&self, command: &str, dir: &Path) -> Option<TestCounts> {
        let output = match run_process(&ProcessSpec::shell(command, dir), self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %command, error = %e, "Test harness failed to start");
                return None;
            }
        };

        if output.timed_out {
            warn!(command = %command, "Test harness timed out");
            return None;
        }

        let counts = parse_test_counts(&output.stdout)
            .or_else(|| parse_test_counts(&output.stderr));
        debug!(command = %command, exit_code = ?output.exit_code, counts = ?counts, "Test harness finished");
        counts
    }

    async fn run_quality(&self, command: &str, dir: &Path) -> Option<f64> {
        match run_process(&ProcessSpec::shell(command, dir), self.timeout).await {
            Ok(output) if !output.timed_out => parse_quality_score(&output.stdout),
            Ok(_) => {
                warn!(command = %command, "Quality probe timed out");
                None
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Quality probe failed to start");
                None
            }
        }
    }
}

/// Expected outputs that do not exist in `workspace`.
pub fn missing_outputs(task: &Task, workspace: &Path) -> Vec<String> {
    task.expected_outputs
        .iter()
        .filter(|o| !join_inside(workspace, &o.path).is_some_and(|p| p.exists()))
        .map(|o| o.path.clone())
        .collect()
}
