//! Samples produced by the window extractor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tc_core::types::{ClassProbs, Direction, SplitTag, Timestamp};

/// Named feature values for one sample. Keys iterate in sorted order.
pub type FeatureVector = BTreeMap<String, f64>;

/// Per-sample target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Direction over the horizon; `None` within `horizon` of the end.
    pub direction: Option<Direction>,
    /// Next-step mid price (auxiliary regression target).
    pub next_mid: Option<f64>,
}

/// One windowed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position of the anchoring snapshot in the input sequence.
    pub index: usize,
    pub timestamp: Timestamp,
    pub mid_price: f64,
    pub features: FeatureVector,
    pub label: Label,
    pub split: SplitTag,
}

impl Sample {
    /// Whether the sample carries a direction label and can be trained on.
    pub fn is_labelled(&self) -> bool {
        self.label.direction.is_some()
    }

    /// One-hot training target, if labelled.
    pub fn target(&self) -> Option<ClassProbs> {
        self.label.direction.map(Direction::one_hot)
    }
}

/// Summary of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Samples emitted (labelled or not).
    pub candidates: usize,
    /// Samples carrying a direction label.
    pub labelled: usize,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
    /// Labelled samples per class, in class-index order (down, flat, up).
    pub class_counts: [usize; 3],
    /// Extraction stopped early on a cancellation request.
    pub cancelled: bool,
}

impl ExtractionReport {
    pub(crate) fn record(&mut self, sample: &Sample) {
        self.candidates += 1;
        match sample.split {
            SplitTag::Train => self.train += 1,
            SplitTag::Validation => self.validation += 1,
            SplitTag::Test => self.test += 1,
        }
        if let Some(direction) = sample.label.direction {
            self.labelled += 1;
            self.class_counts[direction.class_index()] += 1;
        }
    }
}

/// Samples plus the report describing how they were produced.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub samples: Vec<Sample>,
    pub report: ExtractionReport,
}

impl Extraction {
    /// Labelled samples carrying the given split tag, in original order.
    pub fn split(&self, tag: SplitTag) -> Vec<Sample> {
        self.samples
            .iter()
            .filter(|s| s.split == tag && s.is_labelled())
            .cloned()
            .collect()
    }

    /// All labelled samples, in original order.
    pub fn labelled(&self) -> Vec<Sample> {
        self.samples
            .iter()
            .filter(|s| s.is_labelled())
            .cloned()
            .collect()
    }
}
