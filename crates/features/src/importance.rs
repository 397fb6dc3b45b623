//! Feature ranking, selection and flattening.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sample::{FeatureVector, Sample};

/// Ranked feature importances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Top keys with their |Pearson r| against the label sign, descending.
    pub ranked: Vec<(String, f64)>,
    /// Sum of the importances of every scored key (not only the top N).
    pub total: f64,
}

/// Keys present in every sample, sorted.
pub fn feature_keys(samples: &[Sample]) -> Vec<String> {
    common_keys(samples.iter().map(|s| &s.features))
}

fn common_keys<'a>(vectors: impl IntoIterator<Item = &'a FeatureVector>) -> Vec<String> {
    let mut iter = vectors.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut common: BTreeSet<&String> = first.keys().collect();
    for fv in iter {
        common.retain(|k| fv.contains_key(*k));
    }
    common.into_iter().cloned().collect()
}

/// Flatten feature vectors into rows ordered by `keys`.
///
/// A key missing from a sample contributes 0.
pub fn feature_matrix(samples: &[Sample], keys: &[String]) -> Vec<Vec<f64>> {
    samples
        .iter()
        .map(|s| keys.iter().map(|k| s.features.get(k).copied().unwrap_or(0.0)).collect())
        .collect()
}

/// Pearson correlation, 0 when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mx = xs[..n].iter().sum::<f64>() / nf;
    let my = ys[..n].iter().sum::<f64>() / nf;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let (dx, dy) = (x - mx, y - my);
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Rank features by |Pearson r| against the label sign (-1, 0, +1).
///
/// Only labelled samples and keys common to all of them are scored. Ties
/// keep key order.
pub fn feature_importance(samples: &[Sample], top_n: usize) -> FeatureImportance {
    let labelled: Vec<&Sample> = samples.iter().filter(|s| s.is_labelled()).collect();
    if labelled.is_empty() {
        return FeatureImportance::default();
    }
    let keys = common_keys(labelled.iter().map(|s| &s.features));

    let ys: Vec<f64> = labelled
        .iter()
        .filter_map(|s| s.label.direction.map(|d| d.sign() as f64))
        .collect();

    let mut scored: Vec<(String, f64)> = keys
        .into_iter()
        .map(|key| {
            let xs: Vec<f64> = labelled.iter().map(|s| s.features[&key]).collect();
            let score = pearson(&xs, &ys).abs();
            (key, score)
        })
        .collect();

    let total: f64 = scored.iter().map(|(_, v)| v).sum();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);
    FeatureImportance {
        ranked: scored,
        total,
    }
}

/// Keep only `keys` in each sample's features. Labels and tags are preserved.
pub fn select_features(samples: &[Sample], keys: &[String]) -> Vec<Sample> {
    samples
        .iter()
        .map(|s| {
            let features: FeatureVector = s
                .features
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            Sample {
                features,
                ..s.clone()
            }
        })
        .collect()
}
