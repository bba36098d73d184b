//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Route table → Chains → Bind listeners
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve termination future
//!
//! Shutdown (shutdown.rs):
//!     Signal → Readiness 503 → Drain primary → Final scrape → Drain metrics
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown bounded by a single deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{DrainOutcome, ListenerHandle, ShutdownPhase, ShutdownReport, ShutdownSequencer, ShutdownStep};
pub use signals::termination_signal;
pub use startup::{BoundGateway, Gateway};
