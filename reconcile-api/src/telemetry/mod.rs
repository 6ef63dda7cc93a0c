//! Reconcile Telemetry
//!
//! Structured logging for the API process. Spans opened by the engine and
//! by the HTTP trace layer land in the same subscriber.

pub mod tracer;

pub use tracer::{init_tracer, LogFormat, TelemetryConfig};
