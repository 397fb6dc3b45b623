//! # tc-ml
//!
//! The model side of the pipeline: the [`TrainableModel`] capability the
//! training loop drives, and a candle-backed [`DirectionClassifier`] that
//! implements it.

pub mod classifier;
pub mod model;
pub mod normalize;

pub use classifier::{ClassifierFactory, DirectionClassifier};
pub use model::{argmax, ModelFactory, ModelSummary, TrainableModel};
pub use normalize::NormStats;
