//! Core types for the TickCast pipeline.
//!
//! Snapshots are immutable once ingested and carry plain `f64` prices: every
//! consumer downstream of ingestion is numeric (features, losses, returns),
//! so there is no fixed-point layer here.

pub mod label;
pub mod market;
pub mod snapshot;
pub mod timestamp;

// Re-export primary types for convenient access via `tc_core::types::*`.
pub use label::{ClassProbs, Direction, SplitTag, NUM_CLASSES};
pub use market::{Side, Symbol};
pub use snapshot::Snapshot;
pub use timestamp::Timestamp;
