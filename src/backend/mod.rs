//! Backend handler abstractions.
//!
//! A route's `protocol` tag selects a [`HandlerFactory`]; the factory turns the
//! route's [`BackendDescriptor`] into the innermost service of its chain.
//! Only HTTP is built in, but the registry takes any factory so further
//! protocols plug in without touching routing.

mod http;

pub use self::http::{HttpHandlerFactory, ProxyHandler};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::uri::Authority;

use crate::config::{RouteConfig, TimeoutConfig};
use crate::error::ConfigError;
use crate::http::RouteService;

/// Backend protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
}

impl Protocol {
    /// Resolve a configuration tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a route forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDescriptor {
    /// Plain HTTP/1.1 backend at `host:port`.
    Http { host: String },
}

impl BackendDescriptor {
    /// Read the backend section matching the route's protocol tag.
    pub fn resolve(route: &RouteConfig) -> Result<Self, ConfigError> {
        let protocol = Protocol::from_tag(&route.protocol).ok_or_else(|| {
            ConfigError::UnknownProtocol {
                path: route.path.clone(),
                tag: route.protocol.clone(),
            }
        })?;

        match protocol {
            Protocol::Http => {
                let http = route.http.as_ref().ok_or_else(|| ConfigError::MissingBackend {
                    path: route.path.clone(),
                    protocol: protocol.to_string(),
                })?;
                if http.host.parse::<Authority>().is_err() {
                    return Err(ConfigError::InvalidBackendHost {
                        path: route.path.clone(),
                        host: http.host.clone(),
                    });
                }
                Ok(Self::Http {
                    host: http.host.clone(),
                })
            }
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http { .. } => Protocol::Http,
        }
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { host } => write!(f, "http://{host}"),
        }
    }
}

/// Builds the innermost service of a route.
pub trait HandlerFactory: Send + Sync + fmt::Debug {
    fn protocol(&self) -> Protocol;

    /// Build a handler for `descriptor`. `path` is only used for errors.
    fn build(&self, path: &str, descriptor: &BackendDescriptor) -> Result<RouteService, ConfigError>;
}

/// Protocol → factory lookup.
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    factories: HashMap<Protocol, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    /// Empty registry. Every route will fail to resolve until a factory is
    /// registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTTP factory.
    pub fn with_defaults(timeouts: &TimeoutConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpHandlerFactory::new(Duration::from_millis(
            timeouts.connect_ms,
        ))));
        registry
    }

    /// Register a factory, replacing any previous one for the same protocol.
    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factories.insert(factory.protocol(), factory);
    }

    pub fn factory(&self, protocol: Protocol) -> Option<&Arc<dyn HandlerFactory>> {
        self.factories.get(&protocol)
    }

    /// Build the handler for a route's backend.
    pub fn build_handler(&self, path: &str, descriptor: &BackendDescriptor) -> Result<RouteService, ConfigError> {
        let protocol = descriptor.protocol();
        let factory = self.factory(protocol).ok_or_else(|| ConfigError::NoHandler {
            path: path.to_string(),
            protocol: protocol.to_string(),
        })?;
        factory.build(path, descriptor)
    }
}
