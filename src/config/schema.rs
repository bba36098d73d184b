//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Primary (traffic) listener.
    pub listener: ListenerConfig,

    /// Metrics listener.
    pub metrics: MetricsConfig,

    /// Request and backend timeouts.
    pub timeouts: TimeoutConfig,

    /// Shutdown sequencing.
    pub shutdown: ShutdownConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Ordered route rules. Order matters for collision detection and
    /// equal-specificity tie-breaks.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Metrics listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Bind address of the scrape endpoint.
    pub bind_address: String,

    /// Path serving the Prometheus exposition.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9090".to_string(),
            path: "/metrics".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a whole request, from chain entry to the last relayed
    /// body byte.
    pub request_ms: u64,

    /// Backend connection establishment timeout.
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            connect_ms: 5_000,
        }
    }
}

/// Shutdown sequencing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for the whole drain. Should exceed the scrape interval.
    pub delay_ms: u64,

    /// Pause between flipping readiness and draining the primary listener.
    pub readiness_grace_ms: u64,

    /// Keep the metrics listener up until one more scrape is served.
    pub final_scrape: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            readiness_grace_ms: 0,
            final_scrape: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// A single route rule as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern, e.g. `/drivers/{id:[0-9]+}`.
    pub path: String,

    /// HTTP method (exact match).
    #[serde(default = "default_method")]
    pub method: String,

    /// Protocol tag selecting the backend handler.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// HTTP backend settings, required when `protocol = "http"`.
    #[serde(default)]
    pub http: Option<HttpBackendConfig>,

    /// Required query parameters. A non-empty list turns the rule into a
    /// query overlay consulted only after path rules.
    #[serde(default)]
    pub query: Vec<QueryParamConfig>,

    /// Wrap the route in the CORS overlay and accept preflight requests.
    #[serde(default)]
    pub cors: bool,
}

impl RouteConfig {
    /// Convenience constructor for a plain HTTP proxy route.
    pub fn http(method: impl Into<String>, path: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            protocol: default_protocol(),
            http: Some(HttpBackendConfig { host: host.into() }),
            query: Vec::new(),
            cors: false,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_protocol() -> String {
    "http".to_string()
}

/// HTTP backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpBackendConfig {
    /// Backend authority, `host:port`.
    pub host: String,
}

/// A required query parameter of an overlay route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryParamConfig {
    pub key: String,
    pub pattern: QueryPattern,
}

/// Closed set of value shapes a query parameter may be required to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPattern {
    /// Decimal digits, e.g. a user id.
    Numeric,
    /// `Region/City` tz database name.
    TimeZone,
    /// Decimal seconds since the Unix epoch.
    EpochSeconds,
    /// One of `day`, `week`, `month`.
    Period,
}
