//! Scoring: raw metrics to dimension scores, dimension scores to an
//! overall score.

pub mod engine;
pub mod metrics;

pub use engine::{normalized_weights, score, ScoredResult};
pub use metrics::{aggregate, DimensionScores, NEUTRAL_SCORE};

use crate::runner::result::{BenchmarkResult, VerificationOutcome};
use crate::task::Task;

/// Aggregates and scores one pairing.
pub fn score_pairing(
    task: &Task,
    agent: &str,
    result: &BenchmarkResult,
    verification: &VerificationOutcome,
) -> ScoredResult {
    let scores = aggregate(task, agent, result, verification);
    score(&scores, &task.weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::result::TestCounts;
    use crate::task::manifest::fixtures::quicksort;

    fn passing() -> VerificationOutcome {
        VerificationOutcome {
            tests: Some(TestCounts::new(10, 0)),
            code_quality: None,
            missing_outputs: Vec::new(),
        }
    }

    #[test]
    fn test_quicksort_within_budget_scores_high() {
        let task = quicksort();
        let result = BenchmarkResult::success(90.0).with_cost(0.03).with_tool_calls(10);
        let scored = score_pairing(&task, "agentX", &result, &passing());

        assert_eq!(scored.scores.correctness, Some(100.0));
        assert_eq!(scored.scores.speed, 100.0);
        assert_eq!(scored.scores.cost, 100.0);
        assert_eq!(scored.scores.autonomy, 100.0);
        assert!(scored.overall.unwrap() >= 95.0);
    }

    #[test]
    fn test_quicksort_slow_and_expensive() {
        let task = quicksort();
        let result = BenchmarkResult::success(540.0).with_cost(0.12).with_tool_calls(10);
        let scored = score_pairing(&task, "agentX", &result, &passing());

        assert_eq!(scored.scores.speed, 0.0);
        assert_eq!(scored.scores.cost, 0.0);
        assert_eq!(scored.scores.correctness, Some(100.0));
        assert_eq!(scored.scores.autonomy, 100.0);
        assert_eq!(scored.overall, Some(56.0));
    }
}
