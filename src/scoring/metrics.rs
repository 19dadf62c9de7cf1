//! Normalizes raw execution data into per-dimension scores.
//!
//! Every function here is pure. Scores are in `[0, 100]`.

use serde::{Deserialize, Serialize};

use crate::runner::result::{BenchmarkResult, TestCounts, VerificationOutcome};
use crate::task::{AutonomyCriteria, Dimension, Task};

/// Score given when a signal is unavailable.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Wall time, as a multiple of the estimate, at which speed reaches zero.
pub const SPEED_ZERO_FACTOR: f64 = 3.0;

/// Cost, as a multiple of the budget, at which the cost score reaches zero.
pub const COST_ZERO_FACTOR: f64 = 2.0;

/// Autonomy points lost per retry beyond the allowance.
pub const RETRY_PENALTY: f64 = 10.0;

/// Autonomy points lost per tool call beyond the allowance.
pub const TOOL_CALL_PENALTY: f64 = 2.0;

/// Per-dimension scores for one pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    /// `None` when the test harness is unavailable or ran no tests.
    pub correctness: Option<f64>,
    pub speed: f64,
    pub cost: f64,
    pub autonomy: f64,
    pub code_quality: f64,
}

impl DimensionScores {
    /// Score for a dimension; `None` only for undefined correctness.
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Correctness => self.correctness,
            Dimension::Speed => Some(self.speed),
            Dimension::Cost => Some(self.cost),
            Dimension::Autonomy => Some(self.autonomy),
            Dimension::CodeQuality => Some(self.code_quality),
        }
    }
}

/// Clamps into `[0, 100]`; NaN becomes 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Share of passing tests.
pub fn correctness_score(tests: Option<TestCounts>) -> Option<f64> {
    let tests = tests?;
    if tests.total == 0 {
        return None;
    }
    let passed = tests.passed.min(tests.total);
    Some(clamp_score(f64::from(passed) / f64::from(tests.total) * 100.0))
}

/// 100 up to the estimate, then linear down to 0 at [`SPEED_ZERO_FACTOR`]
/// times the estimate.
pub fn speed_score(wall_time: f64, estimated_time: f64) -> f64 {
    if !(estimated_time > 0.0) {
        return NEUTRAL_SCORE;
    }
    if wall_time <= estimated_time {
        return 100.0;
    }
    let span = estimated_time * (SPEED_ZERO_FACTOR - 1.0);
    clamp_score(100.0 * (1.0 - (wall_time - estimated_time) / span))
}

/// 100 up to the budget, then linear down to 0 at [`COST_ZERO_FACTOR`]
/// times the budget. Without a budget the score is neutral.
pub fn cost_score(cost: f64, budget: Option<f64>) -> f64 {
    let Some(budget) = budget else {
        return NEUTRAL_SCORE;
    };
    if cost <= budget {
        return 100.0;
    }
    if budget <= 0.0 {
        return 0.0;
    }
    let span = budget * (COST_ZERO_FACTOR - 1.0);
    clamp_score(100.0 * (1.0 - (cost - budget) / span))
}

/// 100 minus penalties for retries and tool calls beyond the criteria.
pub fn autonomy_score(retries: u32, tool_calls: u32, criteria: &AutonomyCriteria) -> f64 {
    let excess_retries = retries.saturating_sub(criteria.max_retries);
    let excess_calls = tool_calls.saturating_sub(criteria.max_tool_calls);
    clamp_score(
        100.0
            - f64::from(excess_retries) * RETRY_PENALTY
            - f64::from(excess_calls) * TOOL_CALL_PENALTY,
    )
}

/// External quality signal, neutral when unavailable.
pub fn quality_score(signal: Option<f64>) -> f64 {
    signal.map(clamp_score).unwrap_or(NEUTRAL_SCORE)
}

/// Computes all dimension scores for one pairing.
pub fn aggregate(
    task: &Task,
    agent: &str,
    result: &BenchmarkResult,
    verification: &VerificationOutcome,
) -> DimensionScores {
    DimensionScores {
        correctness: correctness_score(verification.tests),
        speed: speed_score(result.wall_time, task.estimated_time),
        cost: cost_score(result.cost, task.budget_for(agent)),
        autonomy: autonomy_score(result.retries, result.tool_calls, &task.autonomy_criteria),
        code_quality: quality_score(verification.code_quality),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::manifest::fixtures::quicksort;

    #[test]
    fn test_correctness() {
        assert_eq!(correctness_score(Some(TestCounts::new(10, 0))), Some(100.0));
        assert_eq!(correctness_score(Some(TestCounts::new(3, 1))), Some(75.0));
        assert_eq!(correctness_score(Some(TestCounts::default())), None);
        assert_eq!(correctness_score(None), None);
    }

    #[test]
    fn test_speed_curve_is_linear() {
        assert_eq!(speed_score(90.0, 180.0), 100.0);
        assert_eq!(speed_score(180.0, 180.0), 100.0);
        assert_eq!(speed_score(360.0, 180.0), 50.0);
        assert_eq!(speed_score(540.0, 180.0), 0.0);
        assert_eq!(speed_score(10_000.0, 180.0), 0.0);
    }

    #[test]
    fn test_cost_curve_is_linear() {
        assert_eq!(cost_score(0.03, Some(0.05)), 100.0);
        assert!((cost_score(0.075, Some(0.05)) - 50.0).abs() < 1e-9);
        assert_eq!(cost_score(0.10, Some(0.05)), 0.0);
        assert_eq!(cost_score(0.12, Some(0.05)), 0.0);
    }

    #[test]
    fn test_cost_edge_cases() {
        assert_eq!(cost_score(0.5, None), NEUTRAL_SCORE);
        assert_eq!(cost_score(0.0, Some(0.0)), 100.0);
        assert_eq!(cost_score(0.01, Some(0.0)), 0.0);
    }

    #[test]
    fn test_autonomy_penalties() {
        let criteria = AutonomyCriteria {
            max_retries: 2,
            max_tool_calls: 20,
            error_recovery: true,
        };
        assert_eq!(autonomy_score(0, 10, &criteria), 100.0);
        assert_eq!(autonomy_score(2, 20, &criteria), 100.0);
        assert_eq!(autonomy_score(4, 20, &criteria), 80.0);
        assert_eq!(autonomy_score(3, 25, &criteria), 80.0);
        assert_eq!(autonomy_score(50, 500, &criteria), 0.0);
    }

    #[test]
    fn test_quality_neutral_default() {
        assert_eq!(quality_score(None), 50.0);
        assert_eq!(quality_score(Some(140.0)), 100.0);
        assert_eq!(quality_score(Some(f64::NAN)), 0.0);
    }

    #[test]
    fn test_aggregate_quicksort() {
        let task = quicksort();
        let result = BenchmarkResult::success(90.0).with_cost(0.03).with_tool_calls(10);
        let verification = VerificationOutcome {
            tests: Some(TestCounts::new(10, 0)),
            code_quality: None,
            missing_outputs: Vec::new(),
        };

        let scores = aggregate(&task, "agentX", &result, &verification);
        assert_eq!(scores.correctness, Some(100.0));
        assert_eq!(scores.speed, 100.0);
        assert_eq!(scores.cost, 100.0);
        assert_eq!(scores.autonomy, 100.0);
        assert_eq!(scores.code_quality, NEUTRAL_SCORE);
    }
}
