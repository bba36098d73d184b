//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → RouteTable::build (protocol resolution, collisions)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields except routes have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config};
pub use schema::GatewayConfig;
pub use schema::HttpBackendConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::MetricsConfig;
pub use schema::ObservabilityConfig;
pub use schema::QueryParamConfig;
pub use schema::QueryPattern;
pub use schema::RouteConfig;
pub use schema::ShutdownConfig;
pub use schema::TimeoutConfig;
