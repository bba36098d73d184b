//! Per-route middleware chain.
//!
//! # Data Flow
//! ```text
//! dispatcher (MatchedRoute in extensions)
//!     → recover.rs   PanicRecovery   (RequestContext, panic → 500)
//!     → logging.rs   RequestLogging  (span, start/complete events)
//!     → timing.rs    MetricsTiming   (gateway_response_time)
//!     → overlays     e.g. cors.rs
//!     → backend handler
//! ```
//!
//! # Design Decisions
//! - The three mandatory layers are fixed, in that order; a chain without
//!   them cannot be constructed
//! - Overlays may only follow the mandatory prefix, each at most once
//! - Every layer is a plain tower `Layer`; `Middleware` only adds the
//!   capability tag and type erasure needed to compose them at runtime

mod cors;
mod logging;
mod recover;
mod timing;

pub use cors::CorsOverlay;
pub use logging::{RequestLogging, RequestLoggingService};
pub use recover::{PanicRecovery, PanicRecoveryService};
pub use timing::{MetricsTiming, MetricsTimingService};

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tower::util::BoxCloneSyncService;

use crate::error::ConfigError;
use crate::observability::MetricsRecorder;

/// Type-erased service at every level of a route chain.
pub type RouteService = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// What a middleware contributes to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    PanicRecovery,
    RequestLogging,
    MetricsTiming,
    Cors,
}

impl Capability {
    /// Overlays are optional and may only follow the mandatory prefix.
    pub const fn is_overlay(self) -> bool {
        matches!(self, Self::Cors)
    }
}

/// Required chain prefix, outermost first.
pub const MANDATORY_PREFIX: [Capability; 3] = [
    Capability::PanicRecovery,
    Capability::RequestLogging,
    Capability::MetricsTiming,
];

/// A chain element.
pub trait Middleware: Send + Sync + fmt::Debug {
    fn capability(&self) -> Capability;

    /// Wrap `inner`, returning the composed service.
    fn wrap(&self, inner: RouteService) -> RouteService;
}

/// Ordered middleware, outermost first.
#[derive(Debug, Clone)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Validate and build a chain.
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Result<Self, ConfigError> {
        let capabilities: Vec<_> = layers.iter().map(|m| m.capability()).collect();

        if capabilities.len() < MANDATORY_PREFIX.len()
            || capabilities[..MANDATORY_PREFIX.len()] != MANDATORY_PREFIX
        {
            return Err(ConfigError::InvalidChain(format!(
                "chain must start with {MANDATORY_PREFIX:?}, got {capabilities:?}"
            )));
        }

        let mut overlays = HashSet::new();
        for capability in &capabilities[MANDATORY_PREFIX.len()..] {
            if !capability.is_overlay() {
                return Err(ConfigError::InvalidChain(format!(
                    "{capability:?} is only allowed in the mandatory prefix"
                )));
            }
            if !overlays.insert(*capability) {
                return Err(ConfigError::InvalidChain(format!(
                    "overlay {capability:?} appears twice"
                )));
            }
        }

        Ok(Self { layers })
    }

    /// The mandatory prefix with no overlays.
    pub fn standard(request_timeout: Duration, metrics: MetricsRecorder) -> Self {
        Self {
            layers: vec![
                Arc::new(PanicRecovery::new(request_timeout)),
                Arc::new(RequestLogging::new()),
                Arc::new(MetricsTiming::new(metrics)),
            ],
        }
    }

    /// A copy of this chain with `overlay` appended innermost.
    pub fn with_overlay(&self, overlay: Arc<dyn Middleware>) -> Result<Self, ConfigError> {
        let mut layers = self.layers.clone();
        layers.push(overlay);
        Self::new(layers)
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.layers.iter().map(|m| m.capability()).collect()
    }

    /// Wrap `handler` so the first layer ends up outermost.
    pub fn compose(&self, handler: RouteService) -> RouteService {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware.wrap(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::{ready, Ready};
    use std::task::{Context, Poll};

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tower::{service_fn, Service, ServiceExt};

    use crate::http::{MatchedRoute, RequestContextExt, X_REQUEST_ID};

    fn chain() -> MiddlewareChain {
        MiddlewareChain::standard(Duration::from_secs(1), MetricsRecorder::new())
    }

    fn request(template: &str) -> Request<Body> {
        let mut req = Request::builder()
            .uri("/drivers/1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(MatchedRoute::new(Arc::from(template), Vec::new()));
        req
    }

    #[test]
    fn standard_chain_has_mandatory_prefix() {
        assert_eq!(chain().capabilities(), MANDATORY_PREFIX.to_vec());
    }

    #[test]
    fn rejects_missing_prefix() {
        let layers: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(RequestLogging::new()),
            Arc::new(PanicRecovery::new(Duration::from_secs(1))),
            Arc::new(MetricsTiming::new(MetricsRecorder::new())),
        ];
        assert!(matches!(
            MiddlewareChain::new(layers),
            Err(ConfigError::InvalidChain(_))
        ));
    }

    #[test]
    fn rejects_duplicate_overlay() {
        let chain = chain()
            .with_overlay(Arc::new(CorsOverlay::permissive()))
            .unwrap();
        assert!(chain.with_overlay(Arc::new(CorsOverlay::permissive())).is_err());
    }

    #[test]
    fn rejects_mandatory_layer_as_overlay() {
        assert!(chain()
            .with_overlay(Arc::new(RequestLogging::new()))
            .is_err());
    }

    #[tokio::test]
    async fn handler_sees_context_and_response_echoes_id() {
        let handler = BoxCloneSyncService::new(service_fn(|req: Request<Body>| async move {
            let id = req.context().map(|c| c.request_id().to_string()).unwrap_or_default();
            Ok::<_, Infallible>(id.into_response())
        }));
        let service = chain().compose(handler);

        let mut req = request("/drivers/{id}");
        req.headers_mut().insert(X_REQUEST_ID, "corr-1".parse().unwrap());
        let response = service.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "corr-1");
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"corr-1");
    }

    /// Answers 503 unless `poll_ready` was called on this very instance.
    #[derive(Default)]
    struct RequiresReady {
        ready: bool,
    }

    impl Clone for RequiresReady {
        fn clone(&self) -> Self {
            Self::default()
        }
    }

    impl Service<Request<Body>> for RequiresReady {
        type Response = Response;
        type Error = Infallible;
        type Future = Ready<Result<Response, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.ready = true;
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            let status = if std::mem::take(&mut self.ready) {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            ready(Ok(status.into_response()))
        }
    }

    #[tokio::test]
    async fn layers_call_the_instance_that_was_polled_ready() {
        let mut service = chain().compose(BoxCloneSyncService::new(RequiresReady::default()));

        for _ in 0..2 {
            let response = service
                .ready()
                .await
                .unwrap()
                .call(request("/drivers/{id}"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let handler = BoxCloneSyncService::new(service_fn(|_req: Request<Body>| async move {
            if true {
                panic!("handler exploded");
            }
            Ok::<Response, Infallible>(StatusCode::OK.into_response())
        }));
        let metrics = MetricsRecorder::new();
        let service = MiddlewareChain::standard(Duration::from_secs(1), metrics.clone()).compose(handler);

        let response = service.clone().oneshot(request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"internal_error"}"#);

        // The service stays usable after a panic.
        let response = service.oneshot(request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn timing_records_route_template() {
        let handler = BoxCloneSyncService::new(service_fn(|_req: Request<Body>| async move {
            Ok::<_, Infallible>(StatusCode::ACCEPTED.into_response())
        }));
        let metrics = MetricsRecorder::new();
        let service = MiddlewareChain::standard(Duration::from_secs(1), metrics.clone()).compose(handler);

        service.oneshot(request("/drivers/{id}")).await.unwrap();

        let exposition = metrics.render();
        assert!(exposition.contains("gateway_response_time"));
        assert!(exposition.contains(r#"path="/drivers/{id}""#));
        assert!(exposition.contains(r#"status_code="202""#));
    }
}
