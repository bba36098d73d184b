//! Gateway error taxonomy.
//!
//! Two families:
//! - [`ConfigError`]: fatal, raised only while loading configuration or
//!   building the route table. The process exits before serving traffic.
//! - [`GatewayError`]: raised while serving a request. Converted into a
//!   minimal JSON body with a fixed error code; the detail only reaches logs.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::config::validation::ValidationError;

/// Startup-time configuration failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("route {path}: unknown protocol '{tag}'")]
    UnknownProtocol { path: String, tag: String },

    #[error("route {path}: protocol '{protocol}' requires a backend section")]
    MissingBackend { path: String, protocol: String },

    #[error("route {path}: no handler found for protocol '{protocol}'")]
    NoHandler { path: String, protocol: String },

    #[error("route {path}: invalid path pattern: {reason}")]
    InvalidPattern { path: String, reason: String },

    #[error("route {path}: invalid method '{method}'")]
    InvalidMethod { path: String, method: String },

    #[error("route {method} {path} collides with an earlier route")]
    RouteCollision { method: String, path: String },

    #[error("route {path}: path is reserved by the gateway")]
    ReservedPath { path: String },

    #[error("route {path}: invalid backend host '{host}'")]
    InvalidBackendHost { path: String, host: String },

    #[error("middleware chain: {0}")]
    InvalidChain(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Request-time failure surfaced to the client.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or missing request data.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Backend unreachable or connection reset before a response arrived.
    #[error("upstream request to {backend} failed: {detail}")]
    Upstream { backend: String, detail: String },

    /// Request deadline expired while waiting on the backend.
    #[error("request deadline exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u128 },

    /// Unexpected fault anywhere in the chain.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl GatewayError {
    /// Fixed, non-sensitive error code sent to clients.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout { .. } => "gateway_timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the full error and turn it into the client-facing response.
    ///
    /// Callers are expected to be inside the request span so the event carries
    /// method, path and correlation id.
    pub fn log_and_respond(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Internal(_) | Self::BadRequest(_) => {
                tracing::error!(error = %self, status = status.as_u16(), "request failed");
            }
            Self::Upstream { .. } | Self::Timeout { .. } => {
                tracing::warn!(error = %self, status = status.as_u16(), "upstream failure");
            }
        }
        self.into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.code() };
        // Serializing a struct with a single static str cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = (self.status_code(), bytes).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            GatewayError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Upstream {
                backend: "b".into(),
                detail: "refused".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Timeout { elapsed_ms: 5 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn upstream_body_hides_detail() {
        let response = GatewayError::Upstream {
            backend: "10.0.0.7:8080".into(),
            detail: "tcp connect error: Connection refused (os error 111)".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_string(response).await;
        assert_eq!(body, r#"{"error":"upstream_error"}"#);
    }

    #[tokio::test]
    async fn internal_body_is_generic() {
        let body = body_string(GatewayError::Internal("secret".into()).into_response()).await;
        assert_eq!(body, r#"{"error":"internal_error"}"#);
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError::new("listener.bind_address", "must be a socket address"),
            ValidationError::new("shutdown.delay_ms", "must be greater than zero"),
        ]);
        let text = err.to_string();
        assert!(text.contains("listener.bind_address"));
        assert!(text.contains("shutdown.delay_ms"));
    }
}
