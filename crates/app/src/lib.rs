//! TickCast service layer: library interface for the `tc` binary and
//! integration tests.

pub mod export;
pub mod service;

pub use export::ExportFormat;
pub use service::TrainingService;
