//! Readiness state for the orchestrator readiness check.
//!
//! The gate starts ready and flips to draining exactly once, when shutdown
//! begins. It never flips back.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

const READY: u8 = 0;
const DRAINING: u8 = 1;

/// Shared readiness flag.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    state: Arc<AtomicU8>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(READY)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Flip to draining. Returns `true` only for the call that flipped it.
    pub fn mark_draining(&self) -> bool {
        self.state
            .compare_exchange(READY, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 200 while ready, 503 once draining.
    pub fn status_code(&self) -> StatusCode {
        if self.is_ready() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the readiness path. Any method, empty body.
pub async fn readiness_handler(State(gate): State<ReadinessGate>) -> StatusCode {
    gate.status_code()
}
