use serde::Serialize;
use std::cmp::Ordering;

use crate::error::{SearchError, SearchResult};

/// Per-source fusion weights, non-negative and summing to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    pub answer: f32,
    pub lexical: f32,
    pub title: f32,
}

impl FusionWeights {
    /// Validates and renormalizes raw coefficients, keeping their ratios.
    pub fn new(answer: f32, lexical: f32, title: f32) -> SearchResult<Self> {
        for (name, w) in [("answer", answer), ("lexical", lexical), ("title", title)] {
            if !w.is_finite() || w < 0.0 {
                return Err(SearchError::Configuration(format!("{name} weight must be non-negative, got {w}")));
            }
        }
        let total = answer + lexical + title;
        if !total.is_finite() || total <= 0.0 {
            return Err(SearchError::Configuration(format!(
                "fusion weights must sum to a positive finite value, got {total}"
            )));
        }
        Ok(Self { answer: answer / total, lexical: lexical / total, title: title / total })
    }

    pub fn uses_lexical(&self) -> bool {
        self.lexical > 0.0
    }
}

fn check_len(left: &[f32], right: &[f32]) -> SearchResult<()> {
    if left.len() != right.len() {
        return Err(SearchError::LengthMismatch { left: left.len(), right: right.len() });
    }
    Ok(())
}

/// `answer * sim_answer[i] + title * sim_title[i]`.
pub fn fuse(sim_answer: &[f32], sim_title: &[f32], weights: &FusionWeights) -> SearchResult<Vec<f32>> {
    check_len(sim_answer, sim_title)?;
    Ok(sim_answer
        .iter()
        .zip(sim_title)
        .map(|(a, t)| weights.answer * a + weights.title * t)
        .collect())
}

/// As [`fuse`], plus the lexical term weighted by `weights.lexical`.
pub fn fuse_with_lexical(
    sim_answer: &[f32],
    sim_title: &[f32],
    sim_lexical: &[f32],
    weights: &FusionWeights,
) -> SearchResult<Vec<f32>> {
    check_len(sim_answer, sim_lexical)?;
    let mut fused = fuse(sim_answer, sim_title, weights)?;
    for (f, l) in fused.iter_mut().zip(sim_lexical) {
        *f += weights.lexical * l;
    }
    Ok(fused)
}

/// Descending order for ranking; NaN sorts below every number, -inf included.
pub fn cmp_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Indices of `scores` from best to worst. The sort is stable, so equal
/// scores keep their original candidate order.
pub fn order_by_score(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| cmp_desc(scores[a], scores[b]));
    order
}
