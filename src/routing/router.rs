//! Route table construction and lookup.
//!
//! # Responsibilities
//! - Compile the ordered route configuration into an immutable table
//! - Reject collisions, reserved paths and unresolvable backends at startup
//! - Dispatch a request line (method, path, query) to at most one route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Path rules are consulted first; query overlays only when no path rule
//!   matched, so an overlay can never shadow a path rule
//! - Most specific path rule wins; equal specificity goes to the earlier rule
//! - Routes are unique per method and path shape, plus the predicate set for
//!   overlays; an overlay on a path a rule already claims could never match
//!   and is rejected as a collision
//! - Explicit `None` on no match rather than a silent default

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::backend::{BackendDescriptor, HandlerRegistry};
use crate::config::RouteConfig;
use crate::error::ConfigError;
use crate::health::READINESS_PATH;
use crate::routing::matcher::{PathPattern, QueryPredicate};

/// How a route is selected.
#[derive(Debug, Clone)]
pub enum RouteKind {
    /// Selected by method and path alone.
    Path,
    /// Selected by method, path and a set of required query parameters.
    QueryOverlay(Vec<QueryPredicate>),
}

/// A compiled route rule.
#[derive(Debug, Clone)]
pub struct Route {
    id: usize,
    method: Method,
    pattern: PathPattern,
    kind: RouteKind,
    backend: BackendDescriptor,
    cors: bool,
    template: Arc<str>,
}

impl Route {
    /// Position in the table; stable for the lifetime of the process.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.template()
    }

    /// Label used for logs and metrics. Overlay routes list their query
    /// keys, e.g. `/records?user_id&tz`.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Shared handle to the template, for request extensions.
    pub fn label(&self) -> Arc<str> {
        Arc::clone(&self.template)
    }

    pub fn kind(&self) -> &RouteKind {
        &self.kind
    }

    pub fn backend(&self) -> &BackendDescriptor {
        &self.backend
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub fn is_overlay(&self) -> bool {
        matches!(self.kind, RouteKind::QueryOverlay(_))
    }

    /// Method check. CORS routes also take preflight requests.
    pub fn accepts(&self, method: &Method) -> bool {
        *method == self.method || (self.cors && *method == Method::OPTIONS)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.template, self.backend)
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Captured path parameters followed by matched query values.
    pub params: Vec<(String, String)>,
}

/// Immutable table of compiled routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile route rules in declaration order.
    ///
    /// Fails on the first rule that cannot be compiled, that collides with an
    /// earlier rule, or whose protocol has no registered handler factory.
    pub fn build(configs: &[RouteConfig], registry: &HandlerRegistry) -> Result<Self, ConfigError> {
        let mut routes = Vec::with_capacity(configs.len());
        let mut path_rules = HashSet::new();
        let mut overlay_paths = HashSet::new();
        let mut overlays = HashSet::new();

        for (id, config) in configs.iter().enumerate() {
            let method = config
                .method
                .parse::<Method>()
                .map_err(|_| ConfigError::InvalidMethod {
                    path: config.path.clone(),
                    method: config.method.clone(),
                })?;

            let pattern = PathPattern::parse(&config.path).map_err(|reason| {
                ConfigError::InvalidPattern {
                    path: config.path.clone(),
                    reason,
                }
            })?;

            if pattern.template() == READINESS_PATH {
                return Err(ConfigError::ReservedPath {
                    path: config.path.clone(),
                });
            }

            let backend = BackendDescriptor::resolve(config)?;
            if registry.factory(backend.protocol()).is_none() {
                return Err(ConfigError::NoHandler {
                    path: config.path.clone(),
                    protocol: backend.protocol().to_string(),
                });
            }

            let slot = (method.clone(), pattern.shape());
            let unique = if config.query.is_empty() {
                !overlay_paths.contains(&slot) && path_rules.insert(slot)
            } else {
                let mut predicate_set: Vec<_> = config
                    .query
                    .iter()
                    .map(|q| (q.key.clone(), q.pattern))
                    .collect();
                predicate_set.sort_by(|a, b| a.0.cmp(&b.0));
                let fresh = !path_rules.contains(&slot)
                    && overlays.insert((slot.clone(), predicate_set));
                overlay_paths.insert(slot);
                fresh
            };
            if !unique {
                return Err(ConfigError::RouteCollision {
                    method: method.to_string(),
                    path: config.path.clone(),
                });
            }

            let (kind, template) = if config.query.is_empty() {
                (RouteKind::Path, config.path.clone())
            } else {
                let predicates: Vec<_> = config
                    .query
                    .iter()
                    .map(|q| QueryPredicate::new(q.key.clone(), q.pattern))
                    .collect();
                let keys: Vec<_> = predicates.iter().map(QueryPredicate::key).collect();
                let template = format!("{}?{}", config.path, keys.join("&"));
                (RouteKind::QueryOverlay(predicates), template)
            };

            routes.push(Route {
                id,
                method,
                pattern,
                kind,
                backend,
                cors: config.cors,
                template: Arc::from(template),
            });
        }

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a request line.
    pub fn dispatch(&self, method: &Method, path: &str, query: Option<&str>) -> Option<RouteMatch<'_>> {
        self.match_path(method, path)
            .or_else(|| self.match_overlay(method, path, query))
    }

    fn match_path(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let mut best: Option<RouteMatch<'_>> = None;

        for route in self.routes.iter().filter(|r| !r.is_overlay()) {
            if !route.accepts(method) {
                continue;
            }
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            let better = best
                .as_ref()
                .map_or(true, |b| route.pattern.specificity() > b.route.pattern.specificity());
            if better {
                best = Some(RouteMatch { route, params });
            }
        }

        best
    }

    fn match_overlay(&self, method: &Method, path: &str, query: Option<&str>) -> Option<RouteMatch<'_>> {
        let mut overlays = self
            .routes
            .iter()
            .filter(|r| r.is_overlay() && r.accepts(method))
            .peekable();
        overlays.peek()?;

        let values = parse_query(query.unwrap_or_default());

        overlays.find_map(|route| {
            let RouteKind::QueryOverlay(predicates) = &route.kind else {
                return None;
            };
            let mut params = route.pattern.matches(path)?;
            for predicate in predicates {
                let value = values.get(predicate.key())?;
                if !predicate.accepts(value) {
                    return None;
                }
                params.push((predicate.key().to_string(), value.clone()));
            }
            Some(RouteMatch { route, params })
        })
    }
}

/// Percent-decode the query string. The first occurrence of a key wins.
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        values.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    values
}
