//! HTTP reverse proxy handler.
//!
//! # Responsibilities
//! - Rewrite the request target to the backend authority
//! - Add `X-Forwarded-For` and keep the correlation header
//! - Enforce the request deadline until the last body frame is relayed
//! - Stream the backend response back unchanged
//!
//! # Design Decisions
//! - One pooled hyper client shared by every HTTP route
//! - Outbound requests are always HTTP/1.1 regardless of the inbound version
//! - Any client error before response headers maps to 502; the deadline
//!   maps to 504
//! - Once headers are sent the status is fixed, so a deadline or backend
//!   failure mid-body aborts the client response instead

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::header::HOST;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderName, HeaderValue, Request, Uri, Version};
use axum::response::Response;
use hyper::body::{Body as HttpBody, Frame, Incoming, SizeHint};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::{Instant, Sleep};
use tower::util::BoxCloneSyncService;
use tower::Service;

use crate::backend::{BackendDescriptor, HandlerFactory, Protocol};
use crate::error::{ConfigError, GatewayError};
use crate::http::{RequestContext, RouteService};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

type HttpClient = Client<HttpConnector, Body>;

/// Factory for [`ProxyHandler`]s sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpHandlerFactory {
    client: HttpClient,
}

impl HttpHandlerFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl HandlerFactory for HttpHandlerFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn build(&self, path: &str, descriptor: &BackendDescriptor) -> Result<RouteService, ConfigError> {
        let BackendDescriptor::Http { host } = descriptor;
        let handler = ProxyHandler::new(host, self.client.clone()).map_err(|_| {
            ConfigError::InvalidBackendHost {
                path: path.to_string(),
                host: host.clone(),
            }
        })?;
        Ok(BoxCloneSyncService::new(handler))
    }
}

/// Forwards requests to a single HTTP backend.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    host: Arc<str>,
    authority: Authority,
    host_header: HeaderValue,
    client: HttpClient,
}

impl ProxyHandler {
    pub fn new(host: &str, client: HttpClient) -> Result<Self, axum::http::Error> {
        let authority = host.parse::<Authority>()?;
        let host_header = HeaderValue::from_str(authority.as_str())?;
        Ok(Self {
            host: Arc::from(host),
            authority,
            host_header,
            client,
        })
    }

    /// Forward one request and relay the backend response.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response, GatewayError> {
        let started = Instant::now();
        let deadline = req.extensions().get::<RequestContext>().map(RequestContext::deadline);

        let (mut parts, body) = req.into_parts();

        let mut target = parts.uri.into_parts();
        target.scheme = Some(Scheme::HTTP);
        target.authority = Some(self.authority.clone());
        if target.path_and_query.is_none() {
            target.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = Uri::from_parts(target).map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        parts.version = Version::HTTP_11;
        parts.headers.insert(HOST, self.host_header.clone());

        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            let client_ip = peer.ip().to_string();
            let forwarded = match parts
                .headers
                .get(&X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
            {
                Some(prior) => format!("{prior}, {client_ip}"),
                None => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                parts.headers.insert(X_FORWARDED_FOR, value);
            }
        }

        tracing::debug!(backend = %self.host, uri = %parts.uri, "forwarding request");

        let pending = self.client.request(Request::from_parts(parts, body));
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, pending)
                .await
                .map_err(|_| GatewayError::Timeout {
                    elapsed_ms: started.elapsed().as_millis(),
                })?,
            None => pending.await,
        };

        let response = result.map_err(|e| GatewayError::Upstream {
            backend: self.host.to_string(),
            detail: error_chain(&e),
        })?;

        let (parts, body) = response.into_parts();
        let body = match deadline {
            Some(deadline) => Body::new(DeadlineBody {
                inner: body,
                sleep: Box::pin(tokio::time::sleep_until(deadline)),
                started,
                backend: Arc::clone(&self.host),
            }),
            None => Body::new(body),
        };
        Ok(Response::from_parts(parts, body))
    }
}

/// Backend response body that fails once the request deadline passes.
struct DeadlineBody {
    inner: Incoming,
    sleep: Pin<Box<Sleep>>,
    started: Instant,
    backend: Arc<str>,
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = GatewayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, GatewayError>>> {
        let this = self.get_mut();
        if this.sleep.as_mut().poll(cx).is_ready() {
            let elapsed_ms = this.started.elapsed().as_millis();
            tracing::warn!(
                backend = %this.backend,
                elapsed_ms,
                "request deadline exceeded while relaying response body"
            );
            return Poll::Ready(Some(Err(GatewayError::Timeout { elapsed_ms })));
        }

        let backend = &this.backend;
        Pin::new(&mut this.inner).poll_frame(cx).map_err(|e| {
            tracing::warn!(backend = %backend, error = %e, "backend response body failed");
            GatewayError::Upstream {
                backend: backend.to_string(),
                detail: error_chain(&e),
            }
        })
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Service<Request<Body>> for ProxyHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            match handler.forward(req).await {
                Ok(response) => Ok(response),
                Err(e) => Ok(e.log_and_respond()),
            }
        })
    }
}

/// hyper's top-level client error is terse; the cause is in its sources.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
