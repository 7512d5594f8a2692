//! Prometheus metrics and structured logging for the perpdex client.
//!
//! - Prometheus metrics for stream frames, decode/transport failures,
//!   REST latency and contract invocations
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
