//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, readiness check, route dispatch)
//!     → middleware/ (recovery, logging, timing, overlays)
//!     → request.rs (RequestContext, MatchedRoute in extensions)
//!     → backend handler
//!     → response.rs (gateway-generated responses)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::{Capability, Middleware, MiddlewareChain, RouteService};
pub use request::{MatchedRoute, RequestContext, RequestContextExt, X_REQUEST_ID};
pub use server::GatewayServer;
