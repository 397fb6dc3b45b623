//! # tc-features
//!
//! Windowed feature extraction over order-book snapshot sequences.
//!
//! - [`extractor`]: window extractor, direction labels, temporal split tags
//! - [`indicators`]: moving averages, RSI, volatility, microstructure measures
//! - [`importance`]: feature ranking, selection and flattening for the model
//! - [`dataset`]: JSONL / JSONL.gz snapshot loading

pub mod dataset;
pub mod extractor;
pub mod importance;
pub mod indicators;
pub mod sample;

pub use extractor::{split_tag, ExtractorConfig, FeatureExtractor};
pub use importance::{feature_importance, feature_keys, feature_matrix, select_features, FeatureImportance};
pub use sample::{Extraction, ExtractionReport, FeatureVector, Label, Sample};
