//! Data types for PRisme telemetry.

pub mod telemetry;

pub use telemetry::{IntensityMetrics, TelemetrySnapshot};
