//! Latency histogram layer.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::{Capability, Middleware, RouteService};
use crate::http::RequestContextExt;
use crate::observability::MetricsRecorder;

/// Label used when a request reaches the chain without a matched route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Observes one `gateway_response_time` sample per request, labelled by
/// route template and status code.
#[derive(Debug, Clone)]
pub struct MetricsTiming {
    recorder: MetricsRecorder,
}

impl MetricsTiming {
    pub fn new(recorder: MetricsRecorder) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for MetricsTiming {
    type Service = MetricsTimingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsTimingService {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

impl Middleware for MetricsTiming {
    fn capability(&self) -> Capability {
        Capability::MetricsTiming
    }

    fn wrap(&self, inner: RouteService) -> RouteService {
        BoxCloneSyncService::new(self.layer(inner))
    }
}

#[derive(Debug, Clone)]
pub struct MetricsTimingService<S> {
    inner: S,
    recorder: MetricsRecorder,
}

impl<S> Service<Request<Body>> for MetricsTimingService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let start = Instant::now();
        let route: Arc<str> = req
            .matched_route()
            .map(|m| m.label())
            .unwrap_or_else(|| Arc::from(UNMATCHED_ROUTE));
        let recorder = self.recorder.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = match inner.call(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            recorder.record_response(&route, response.status(), start.elapsed());
            Ok(response)
        })
    }
}
