//! Weighted combination of dimension scores.

use serde::{Deserialize, Serialize};

use super::metrics::{clamp_score, DimensionScores};
use crate::task::{Dimension, Weights};

/// Final score of one pairing. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub scores: DimensionScores,
    /// `None` when the pairing is incomplete.
    pub overall: Option<f64>,
    /// Correctness could not be determined.
    pub incomplete: bool,
}

/// Weights as fractions of their sum, in [`Dimension::ALL`] order.
pub fn normalized_weights(weights: &Weights) -> [(Dimension, f64); 5] {
    weights.normalized()
}

/// `Σ(wᵢ·sᵢ) / Σwᵢ` over clamped inputs.
///
/// An undefined correctness makes the whole result incomplete: `overall`
/// is `None` rather than a number that silently ignores correctness.
pub fn score(scores: &DimensionScores, weights: &Weights) -> ScoredResult {
    let clamped = DimensionScores {
        correctness: scores.correctness.map(clamp_score),
        speed: clamp_score(scores.speed),
        cost: clamp_score(scores.cost),
        autonomy: clamp_score(scores.autonomy),
        code_quality: clamp_score(scores.code_quality),
    };

    let total = weights.total();
    let overall = if total == 0 {
        None
    } else {
        Dimension::ALL
            .iter()
            .map(|d| clamped.get(*d).map(|s| f64::from(weights.get(*d)) * s))
            .sum::<Option<f64>>()
            .map(|weighted| clamp_score(weighted / total as f64))
    };

    ScoredResult {
        scores: clamped,
        overall,
        incomplete: clamped.correctness.is_none(),
    }
}
