//! Observability setup for the paper pipeline binary.

pub mod tracing_setup;

pub use tracing_setup::{init, Telemetry, TelemetryError};
