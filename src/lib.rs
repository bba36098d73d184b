//! Edge HTTP gateway.
//!
//! Routes inbound requests by method, path pattern and query parameters to
//! backend services, wrapping every route in a fixed middleware chain
//! (panic isolation, request logging, latency metrics) plus optional
//! overlays such as CORS. A second listener serves Prometheus metrics, and
//! shutdown is sequenced so orchestrators and scrapers see a clean drain.

// Core subsystems
pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{ConfigError, GatewayError};
pub use lifecycle::{BoundGateway, Gateway, ShutdownReport};
