//! Procedure fan-out pipeline
//!
//! mapping discovery -> bounded invocation -> per-unit collection ->
//! document serialization -> lazy emission

pub mod orchestrator;
pub mod report;
pub mod retry;

pub use orchestrator::{Pipeline, PipelineOptions, PipelineRun};
pub use report::{RunReport, RunReportHandle, RunState, UnitFailure};
pub use retry::RetryConfig;
