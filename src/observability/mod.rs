//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request chain produces:
//!     → logging.rs (structured events inside the request span)
//!     → metrics.rs (gateway_response_time histogram)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → metrics listener (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every event of a request
//! - Metric updates are cheap (atomic bucket increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{metrics_router, MetricsRecorder, RESPONSE_TIME_HISTOGRAM};
