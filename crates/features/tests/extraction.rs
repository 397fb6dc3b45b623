//! End-to-end extraction over a synthetic 200-step series.

use tokio_util::sync::CancellationToken;

use tc_core::config::FeatureGroups;
use tc_core::types::{Snapshot, SplitTag, Symbol, Timestamp};
use tc_features::{feature_importance, feature_keys, feature_matrix, ExtractorConfig, FeatureExtractor};

fn synthetic_series(n: usize) -> Vec<Snapshot> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let mid = 100.0 + (t * 0.15).sin() * 2.0 + t * 0.01;
            Snapshot::new(
                Symbol::new("BTCUSDT"),
                Timestamp::from_millis(1_700_000_000_000 + i as u64 * 250),
                mid - 0.05,
                mid + 0.05,
                1.0 + (t * 0.3).cos().abs(),
                1.0 + (t * 0.2).sin().abs(),
            )
            .with_depth(10.0 + t.sin(), 10.0 + t.cos())
            .with_volume((t * 0.4).sin().abs(), (t * 0.5).cos().abs())
        })
        .collect()
}

fn extractor(window_size: usize) -> FeatureExtractor {
    FeatureExtractor::new(ExtractorConfig {
        window_size,
        horizon: 5,
        threshold: 0.001,
        groups: FeatureGroups::default(),
    })
}

#[test]
fn two_hundred_step_scenario() {
    let snaps = synthetic_series(200);
    let out = extractor(10).extract(&snaps, &CancellationToken::new());

    // One candidate per index in [10, 200).
    assert_eq!(out.report.candidates, 190);
    assert_eq!(out.samples.first().unwrap().index, 10);
    assert_eq!(out.samples.last().unwrap().index, 199);

    // The last `horizon` candidates have no direction label.
    assert_eq!(out.report.labelled, 185);
    assert!(out.samples[185..].iter().all(|s| !s.is_labelled()));
    assert!(out.samples[..185].iter().all(|s| s.is_labelled()));
    assert_eq!(out.report.class_counts.iter().sum::<usize>(), 185);

    // Position ratio i / 200 against 0.70 and 0.85.
    assert_eq!(out.report.train, 130);
    assert_eq!(out.report.validation, 30);
    assert_eq!(out.report.test, 30);
    for s in &out.samples {
        let expected = if s.index < 140 {
            SplitTag::Train
        } else if s.index < 170 {
            SplitTag::Validation
        } else {
            SplitTag::Test
        };
        assert_eq!(s.split, expected, "index {}", s.index);
    }

    assert_eq!(out.split(SplitTag::Train).len(), 130);
    assert_eq!(out.split(SplitTag::Validation).len(), 30);
    assert_eq!(out.split(SplitTag::Test).len(), 25);
    assert!(!out.report.cancelled);
}

#[test]
fn extraction_is_deterministic() {
    let snaps = synthetic_series(120);
    let a = extractor(10).extract(&snaps, &CancellationToken::new());
    let b = extractor(10).extract(&snaps, &CancellationToken::new());
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.report, b.report);
}

#[test]
fn split_tags_are_monotonic() {
    for n in [30, 57, 100, 201] {
        let snaps = synthetic_series(n);
        let out = extractor(5).extract(&snaps, &CancellationToken::new());
        let tags: Vec<SplitTag> = out.samples.iter().map(|s| s.split).collect();
        assert!(tags.windows(2).all(|w| w[0] <= w[1]), "non-monotonic tags for n={n}");
    }
}

#[test]
fn window_length_is_fixed() {
    let snaps = synthetic_series(60);
    for w in [1, 4, 15, 25] {
        let out = extractor(w).extract(&snaps, &CancellationToken::new());
        assert_eq!(out.samples.len(), 60 - w);
        assert!(out.samples.iter().all(|s| s.index >= w));
        // Every sample in a run computes the same key set.
        let keys = feature_keys(&out.samples);
        assert!(out.samples.iter().all(|s| s.features.len() == keys.len()));
    }
}

#[test]
fn indicator_bounds_hold_over_series() {
    let snaps = synthetic_series(150);
    let out = extractor(20).extract(&snaps, &CancellationToken::new());
    for s in &out.samples {
        let rsi = s.features["rsi"];
        assert!((0.0..=100.0).contains(&rsi), "rsi {rsi}");
        assert!(s.features["volatility"] >= 0.0);
        assert!(s.features["market_impact"] >= 0.0);
    }
}

#[test]
fn matrix_and_importance_over_training_split() {
    let snaps = synthetic_series(200);
    let out = extractor(10).extract(&snaps, &CancellationToken::new());
    let train = out.split(SplitTag::Train);
    let keys = feature_keys(&train);
    let matrix = feature_matrix(&train, &keys);
    assert_eq!(matrix.len(), train.len());
    assert!(matrix.iter().all(|row| row.len() == keys.len()));

    let imp = feature_importance(&train, 5);
    assert_eq!(imp.ranked.len(), 5);
    assert!(imp.ranked.windows(2).all(|w| w[0].1 >= w[1].1));
    let top_sum: f64 = imp.ranked.iter().map(|(_, v)| v).sum();
    assert!(imp.total >= top_sum - 1e-12);
}
