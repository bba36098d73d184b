//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → matcher.rs (compile path patterns, query predicates)
//!     → router.rs (collision check, backend resolution)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (method, path, query)
//!     → path rules, most specific first
//!     → query overlays, declaration order
//!     → Return: RouteMatch or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Regex only for explicitly constrained parameters
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, QueryPredicate};
pub use router::{Route, RouteKind, RouteMatch, RouteTable};
