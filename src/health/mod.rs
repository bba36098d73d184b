//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator readiness check (GET /ready)
//!     → readiness.rs (ReadinessGate)
//!     → 200 while serving, 503 once shutdown has begun
//!
//! Shutdown sequencer
//!     → ReadinessGate::mark_draining (exactly once)
//! ```
//!
//! # Design Decisions
//! - The readiness route lives outside every route chain: no logging, no
//!   metrics, no correlation id
//! - The gateway reports its own state only; backend health is the
//!   orchestrator's concern

pub mod readiness;

pub use readiness::{readiness_handler, ReadinessGate};

/// Path answered by the readiness check. Routes may not claim it.
pub const READINESS_PATH: &str = "/ready";
