//! Feature window extractor.
//!
//! Turns a time-ordered snapshot sequence into [`Sample`]s. For every index
//! `i >= window_size` the window is the `window_size` preceding snapshots
//! plus snapshot `i`; earlier indices never produce a sample. Labels look
//! strictly forward of `i`; split tags depend only on `i / len`.

use chrono::{Datelike, Timelike};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tc_core::config::{FeatureGroups, TrainingConfig};
use tc_core::types::{Direction, Snapshot, SplitTag};

use crate::indicators;
use crate::sample::{Extraction, ExtractionReport, FeatureVector, Label, Sample};

/// Position ratio below which a sample is tagged Train.
pub const TRAIN_BREAKPOINT: f64 = 0.70;
/// Position ratio below which a sample is tagged Validation.
pub const VALIDATION_BREAKPOINT: f64 = 0.85;

/// Moving-average lookbacks emitted as `moving_average_<n>`.
const MA_PERIODS: [usize; 3] = [5, 10, 20];

/// Extraction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorConfig {
    pub window_size: usize,
    pub horizon: usize,
    pub threshold: f64,
    pub groups: FeatureGroups,
}

impl From<&TrainingConfig> for ExtractorConfig {
    fn from(cfg: &TrainingConfig) -> Self {
        Self {
            window_size: cfg.window_size,
            horizon: cfg.horizon,
            threshold: cfg.threshold,
            groups: cfg.feature_groups,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

/// Split tag for index `i` of a sequence of `len` snapshots.
pub fn split_tag(i: usize, len: usize) -> SplitTag {
    if len == 0 {
        return SplitTag::Train;
    }
    let ratio = i as f64 / len as f64;
    if ratio < TRAIN_BREAKPOINT {
        SplitTag::Train
    } else if ratio < VALIDATION_BREAKPOINT {
        SplitTag::Validation
    } else {
        SplitTag::Test
    }
}

/// Direction of `future` relative to `current` under a relative threshold.
pub fn classify_move(current: f64, future: f64, threshold: f64) -> Direction {
    if future > current * (1.0 + threshold) {
        Direction::Up
    } else if future < current * (1.0 - threshold) {
        Direction::Down
    } else {
        Direction::Flat
    }
}

/// Stateless window extractor.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract samples from the whole sequence.
    ///
    /// The cancellation token is checked before each index. On cancellation
    /// the samples produced so far are returned intact and
    /// [`ExtractionReport::cancelled`] is set.
    pub fn extract(&self, snapshots: &[Snapshot], cancel: &CancellationToken) -> Extraction {
        let w = self.config.window_size;
        let n = snapshots.len();
        let mut samples = Vec::with_capacity(n.saturating_sub(w));
        let mut report = ExtractionReport::default();

        for i in w..n {
            if cancel.is_cancelled() {
                info!(index = i, produced = samples.len(), "feature extraction cancelled");
                report.cancelled = true;
                break;
            }
            let sample = self.sample_at(snapshots, i);
            report.record(&sample);
            samples.push(sample);
        }

        debug!(
            candidates = report.candidates,
            labelled = report.labelled,
            train = report.train,
            validation = report.validation,
            test = report.test,
            "feature extraction finished"
        );
        Extraction { samples, report }
    }

    /// Build the sample anchored at index `i`. Requires `i >= window_size`.
    fn sample_at(&self, snapshots: &[Snapshot], i: usize) -> Sample {
        let w = self.config.window_size;
        let window = &snapshots[i - w..=i];
        let current = &snapshots[i];

        Sample {
            index: i,
            timestamp: current.timestamp,
            mid_price: current.mid_price,
            features: self.features(window),
            label: self.label(snapshots, i),
            split: split_tag(i, snapshots.len()),
        }
    }

    /// Compute the enabled feature groups over one window (current last).
    pub fn features(&self, window: &[Snapshot]) -> FeatureVector {
        let mut fv = FeatureVector::new();
        let Some(current) = window.last() else {
            return fv;
        };
        let groups = self.config.groups;
        if groups.basic {
            basic_features(current, &mut fv);
        }
        if groups.technical {
            technical_features(window, &mut fv);
        }
        if groups.advanced {
            advanced_features(window, &mut fv);
        }
        fv
    }

    fn label(&self, snapshots: &[Snapshot], i: usize) -> Label {
        let current = snapshots[i].mid_price;
        let direction = snapshots
            .get(i + self.config.horizon)
            .map(|future| classify_move(current, future.mid_price, self.config.threshold));
        Label {
            direction,
            next_mid: snapshots.get(i + 1).map(|s| s.mid_price),
        }
    }
}

fn put(fv: &mut FeatureVector, key: &str, value: f64) {
    fv.insert(key.to_string(), value);
}

fn basic_features(s: &Snapshot, fv: &mut FeatureVector) {
    put(fv, "best_bid_price", s.bid_price);
    put(fv, "best_ask_price", s.ask_price);
    put(fv, "best_bid_qty", s.bid_qty);
    put(fv, "best_ask_qty", s.ask_qty);
    put(fv, "mid_price", s.mid_price);
    put(fv, "spread", s.spread);
    put(fv, "spread_bps", s.spread_bps());
    put(fv, "bid_depth", s.bid_depth);
    put(fv, "ask_depth", s.ask_depth);
    put(fv, "bid_volume", s.bid_volume);
    put(fv, "ask_volume", s.ask_volume);
    put(fv, "volume_imbalance", indicators::imbalance(s.bid_volume, s.ask_volume));
    put(fv, "depth_imbalance", indicators::imbalance(s.bid_depth, s.ask_depth));

    let dt = s.timestamp.to_datetime();
    put(fv, "hour", dt.hour() as f64);
    put(fv, "minute", dt.minute() as f64);
    put(fv, "day_of_week", dt.weekday().num_days_from_monday() as f64);
}

fn technical_features(window: &[Snapshot], fv: &mut FeatureVector) {
    let prices: Vec<f64> = window.iter().map(|s| s.mid_price).collect();

    for period in MA_PERIODS {
        if let Some(ma) = indicators::moving_average(&prices, period) {
            fv.insert(format!("moving_average_{period}"), ma);
        }
    }
    if let Some(rsi) = indicators::rsi(&prices, indicators::RSI_PERIOD) {
        put(fv, "rsi", rsi);
    }
    put(fv, "volatility", indicators::log_return_volatility(&prices));
    if let Some((change, pct)) = indicators::price_change(&prices) {
        put(fv, "price_change", change);
        put(fv, "price_change_pct", pct);
    }
}

fn advanced_features(window: &[Snapshot], fv: &mut FeatureVector) {
    let Some(current) = window.last() else {
        return;
    };
    put(fv, "microprice", indicators::microprice(current));
    put(fv, "effective_spread", indicators::effective_spread(current));

    let (ofi, impact) = match window.len().checked_sub(2).map(|p| &window[p]) {
        Some(prev) => (
            indicators::order_flow_imbalance(prev, current),
            indicators::market_impact(prev, current),
        ),
        None => (0.0, 0.0),
    };
    put(fv, "order_flow_imbalance", ofi);
    put(fv, "market_impact", impact);
}
