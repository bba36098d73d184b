//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check route entries are well-formed before the route table is built
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Collisions and protocol resolution are left to `RouteTable::build`

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = parse_addr("listener.bind_address", &config.listener.bind_address, &mut errors);
    let metrics = parse_addr("metrics.bind_address", &config.metrics.bind_address, &mut errors);
    if let (Some(listener), Some(metrics)) = (listener, metrics) {
        if listener == metrics && listener.port() != 0 {
            errors.push(ValidationError::new(
                "metrics.bind_address",
                "must differ from listener.bind_address",
            ));
        }
    }

    if !config.metrics.path.starts_with('/') {
        errors.push(ValidationError::new("metrics.path", "must start with '/'"));
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than zero"));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than zero"));
    }
    if config.shutdown.delay_ms == 0 {
        errors.push(ValidationError::new("shutdown.delay_ms", "must be greater than zero"));
    }
    if config.shutdown.readiness_grace_ms >= config.shutdown.delay_ms {
        errors.push(ValidationError::new(
            "shutdown.readiness_grace_ms",
            "must be smaller than shutdown.delay_ms",
        ));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{i}]");
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{field}.path"),
                format!("'{}' must start with '/'", route.path),
            ));
        }
        if route.method.parse::<Method>().is_err() || route.method.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}.method"),
                format!("'{}' is not an HTTP method", route.method),
            ));
        }
        let mut keys = HashSet::new();
        for param in &route.query {
            if param.key.is_empty() {
                errors.push(ValidationError::new(format!("{field}.query"), "empty key"));
            } else if !keys.insert(param.key.as_str()) {
                errors.push(ValidationError::new(
                    format!("{field}.query"),
                    format!("duplicate key '{}'", param.key),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_addr(field: &str, value: &str, errors: &mut Vec<ValidationError>) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::new(
                field,
                format!("'{value}' must be in format 'IP:PORT'"),
            ));
            None
        }
    }
}
