//! Per-request context.
//!
//! # Responsibilities
//! - Pick the correlation id (inbound `x-request-id` or a fresh UUID v4)
//! - Fix the request deadline at chain entry
//! - Carry the request span so inner layers log inside it
//!
//! # Design Decisions
//! - Created exactly once, by the outermost layer, and stored in request
//!   extensions; handlers read it, they never build their own
//! - Cheap to clone: the id is shared and the span is reference counted

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, Request};
use tokio::time::Instant;
use tracing::Span;
use uuid::Uuid;

/// Header name for the correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request-scoped data shared by every layer of a route chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Arc<str>,
    method: Method,
    path: String,
    deadline: Instant,
    span: Span,
}

impl RequestContext {
    /// Build the context for an inbound request. The deadline starts now.
    pub fn from_request<B>(req: &Request<B>, timeout: Duration) -> Self {
        Self {
            request_id: correlation_id(req.headers()),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            deadline: Instant::now() + timeout,
            span: Span::none(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The request span, or a disabled span before logging is attached.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn attach_span(&mut self, span: Span) {
        self.span = span;
    }
}

/// The route selected by the dispatcher.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    template: Arc<str>,
    params: Arc<[(String, String)]>,
}

impl MatchedRoute {
    pub fn new(template: Arc<str>, params: Vec<(String, String)>) -> Self {
        Self {
            template,
            params: params.into(),
        }
    }

    /// Route template, used as the low-cardinality label in logs and metrics.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn label(&self) -> Arc<str> {
        Arc::clone(&self.template)
    }

    /// Captured path parameters and matched query values.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Access the [`RequestContext`] stored in a request.
pub trait RequestContextExt {
    fn context(&self) -> Option<&RequestContext>;

    fn matched_route(&self) -> Option<&MatchedRoute>;
}

impl<B> RequestContextExt for Request<B> {
    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }

    fn matched_route(&self) -> Option<&MatchedRoute> {
        self.extensions().get::<MatchedRoute>()
    }
}

/// Reuse a well-formed inbound id; otherwise mint one.
fn correlation_id(headers: &HeaderMap) -> Arc<str> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(Arc::from)
        .unwrap_or_else(|| Arc::from(Uuid::new_v4().to_string()))
}
