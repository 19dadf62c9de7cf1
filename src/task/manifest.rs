//! Task model: the immutable description of one benchmark task.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The five fixed scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Correctness,
    Speed,
    Cost,
    Autonomy,
    CodeQuality,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Correctness,
        Dimension::Speed,
        Dimension::Cost,
        Dimension::Autonomy,
        Dimension::CodeQuality,
    ];

    /// Manifest key for this dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Correctness => "correctness",
            Dimension::Speed => "speed",
            Dimension::Cost => "cost",
            Dimension::Autonomy => "autonomy",
            Dimension::CodeQuality => "code_quality",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("Unknown dimension: {}", s))
    }
}

/// Per-dimension weights. Every weight is a positive integer.
///
/// Weights are not required to sum to 100; scoring normalizes by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub correctness: u32,
    pub speed: u32,
    pub cost: u32,
    pub autonomy: u32,
    pub code_quality: u32,
}

impl Weights {
    /// Returns the weight for a dimension.
    pub fn get(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::Correctness => self.correctness,
            Dimension::Speed => self.speed,
            Dimension::Cost => self.cost,
            Dimension::Autonomy => self.autonomy,
            Dimension::CodeQuality => self.code_quality,
        }
    }

    /// Sum of all weights.
    pub fn total(&self) -> u64 {
        Dimension::ALL.iter().map(|d| u64::from(self.get(*d))).sum()
    }

    /// Weights divided by their sum, in [`Dimension::ALL`] order.
    pub fn normalized(&self) -> [(Dimension, f64); 5] {
        let total = self.total() as f64;
        Dimension::ALL.map(|d| {
            let w = if total > 0.0 {
                f64::from(self.get(d)) / total
            } else {
                0.0
            };
            (d, w)
        })
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            correctness: 40,
            speed: 20,
            cost: 15,
            autonomy: 15,
            code_quality: 10,
        }
    }
}

/// Difficulty of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!(
                "Invalid difficulty '{}': must be 'easy', 'medium', or 'hard'",
                other
            )),
        }
    }
}

/// An output file the agent is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    /// Path relative to the task workspace.
    pub path: String,
    /// Free-form kind, e.g. `source`, `test`, `doc`.
    #[serde(rename = "type", default = "default_output_type")]
    pub kind: String,
}

fn default_output_type() -> String {
    "file".to_string()
}

/// Thresholds used to score agent self-sufficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyCriteria {
    pub max_retries: u32,
    pub max_tool_calls: u32,
    #[serde(default)]
    pub error_recovery: bool,
}

impl Default for AutonomyCriteria {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_tool_calls: 50,
            error_recovery: true,
        }
    }
}

/// Budget key that applies to agents without their own entry.
pub const DEFAULT_BUDGET_KEY: &str = "default";

/// Longest estimate or timeout a manifest may declare, in seconds (one week).
pub const MAX_TASK_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

/// A fully loaded, immutable benchmark task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub category: String,
    pub difficulty: Difficulty,
    /// Estimated completion time in seconds.
    pub estimated_time: f64,
    pub description: String,
    pub weights: Weights,
    /// Agent name to USD ceiling.
    pub cost_budget: BTreeMap<String, f64>,
    pub expected_outputs: Vec<ExpectedOutput>,
    pub autonomy_criteria: AutonomyCriteria,
    pub prompt: String,
    /// Hard execution limit in seconds. Defaults to three times the estimate.
    pub timeout: Option<f64>,
    /// Shell command run in the workspace to count passing tests.
    pub test_command: Option<String>,
    /// Shell command run in the workspace that prints a 0-100 quality score.
    pub quality_command: Option<String>,
    /// Directory the task was loaded from.
    pub dir: PathBuf,
}

impl Task {
    /// Budget for an agent, falling back to the `default` entry.
    pub fn budget_for(&self, agent: &str) -> Option<f64> {
        self.cost_budget
            .get(agent)
            .or_else(|| self.cost_budget.get(DEFAULT_BUDGET_KEY))
            .copied()
    }

    /// Execution timeout for this task.
    pub fn timeout(&self) -> Duration {
        let secs = self.timeout.unwrap_or(self.estimated_time * 3.0);
        Duration::try_from_secs_f64(secs.clamp(1.0, MAX_TASK_SECONDS))
            .unwrap_or(Duration::from_secs(MAX_TASK_SECONDS as u64))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let weights = Weights {
            correctness: 3,
            speed: 1,
            cost: 1,
            autonomy: 1,
            code_quality: 1,
        };
        let sum: f64 = weights.normalized().iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(weights.normalized()[0], (Dimension::Correctness, 3.0 / 7.0));
    }

    #[test]
    fn test_budget_fallback() {
        let mut task = fixtures::quicksort();
        assert_eq!(task.budget_for("agentX"), Some(0.05));
        assert_eq!(task.budget_for("aider"), None);

        task.cost_budget.insert(DEFAULT_BUDGET_KEY.to_string(), 0.10);
        assert_eq!(task.budget_for("aider"), Some(0.10));
    }

    #[test]
    fn test_timeout_defaults_to_three_estimates() {
        let mut task = fixtures::quicksort();
        assert_eq!(task.timeout(), Duration::from_secs(540));

        task.timeout = Some(60.0);
        assert_eq!(task.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_is_capped() {
        let max = Duration::from_secs(MAX_TASK_SECONDS as u64);
        let mut task = fixtures::quicksort();

        task.timeout = Some(1.0e20);
        assert_eq!(task.timeout(), max);

        task.timeout = Some(f64::NAN);
        assert_eq!(task.timeout(), max);

        task.timeout = None;
        task.estimated_time = f64::MAX;
        assert_eq!(task.timeout(), max);
    }

    #[test]
    fn test_dimension_round_trip_names() {
        for d in Dimension::ALL {
            assert_eq!(d.as_str().parse::<Dimension>().unwrap(), d);
        }
        assert!("style".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
