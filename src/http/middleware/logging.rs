//! Request logging layer.
//!
//! Opens the request span, attaches it to the [`RequestContext`] so inner
//! layers and handlers log inside it, and emits one event at start and one
//! at completion with status and latency.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use tracing::Instrument;

use super::{Capability, Middleware, RouteService};
use crate::http::{RequestContext, RequestContextExt, X_REQUEST_ID};

#[derive(Debug, Clone, Default)]
pub struct RequestLogging;

impl RequestLogging {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogging {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

impl Middleware for RequestLogging {
    fn capability(&self) -> Capability {
        Capability::RequestLogging
    }

    fn wrap(&self, inner: RouteService) -> RouteService {
        BoxCloneSyncService::new(self.layer(inner))
    }
}

#[derive(Debug, Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLoggingService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let start = Instant::now();
        let request_id = req
            .context()
            .map(|c| c.request_id().to_string())
            .unwrap_or_default();
        let route = req
            .matched_route()
            .map(|m| m.template().to_string())
            .unwrap_or_default();

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
            route = %route,
        );
        if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
            ctx.attach_span(span.clone());
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                tracing::info!("Request started");

                let mut response = match inner.call(req).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                };

                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Request completed"
                );

                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(X_REQUEST_ID, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
