//! Ranking of evaluated runs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::EvaluationMetrics;

/// One run's evaluation on its test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvaluation {
    pub run_id: String,
    pub metrics: EvaluationMetrics,
}

fn by_rank(a: &RunEvaluation, b: &RunEvaluation) -> Ordering {
    let (ca, cb) = (&a.metrics.classification, &b.metrics.classification);
    cb.f1
        .total_cmp(&ca.f1)
        .then_with(|| cb.accuracy.total_cmp(&ca.accuracy))
        .then_with(|| a.run_id.cmp(&b.run_id))
}

/// Sort best first: F1 descending, then accuracy descending, then run id.
pub fn rank_runs(mut runs: Vec<RunEvaluation>) -> Vec<RunEvaluation> {
    runs.sort_by(by_rank);
    runs
}
