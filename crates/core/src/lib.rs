//! # tc-core
//!
//! Shared types, configuration, and utilities for the TickCast training
//! pipeline.
//!
//! This crate provides the foundational building blocks used across all other
//! crates in the workspace: order-book snapshots, nanosecond timestamps,
//! direction labels and split tags, the layered application configuration,
//! the typed hyperparameter set, the caller-visible error taxonomy, and the
//! logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::PipelineError;
