//! Panic isolation. Outermost layer of every route chain.

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::{Capability, Middleware, RouteService};
use crate::error::GatewayError;
use crate::http::{RequestContext, RequestContextExt, X_REQUEST_ID};

/// Creates the [`RequestContext`] and turns a panic anywhere below into a
/// 500 for that request only.
#[derive(Debug, Clone)]
pub struct PanicRecovery {
    request_timeout: Duration,
}

impl PanicRecovery {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl<S> Layer<S> for PanicRecovery {
    type Service = PanicRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicRecoveryService {
            inner,
            request_timeout: self.request_timeout,
        }
    }
}

impl Middleware for PanicRecovery {
    fn capability(&self) -> Capability {
        Capability::PanicRecovery
    }

    fn wrap(&self, inner: RouteService) -> RouteService {
        BoxCloneSyncService::new(self.layer(inner))
    }
}

#[derive(Debug, Clone)]
pub struct PanicRecoveryService<S> {
    inner: S,
    request_timeout: Duration,
}

impl<S> Service<Request<Body>> for PanicRecoveryService<S>
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
        let ctx = RequestContext::from_request(&req, self.request_timeout);
        if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
            req.headers_mut().insert(X_REQUEST_ID, value);
        }
        let route: Arc<str> = req
            .matched_route()
            .map(|m| m.label())
            .unwrap_or_else(|| Arc::from(ctx.path()));
        req.extensions_mut().insert(ctx.clone());

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = %ctx.path(),
                        route = %route,
                        panic = %message,
                        "Handler panicked, request isolated"
                    );
                    let mut response = GatewayError::Internal(message).into_response();
                    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
                        response.headers_mut().insert(X_REQUEST_ID, value);
                    }
                    Ok(response)
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
