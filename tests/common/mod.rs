//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use edge_gateway::config::{GatewayConfig, RouteConfig};
use edge_gateway::health::ReadinessGate;
use edge_gateway::observability::MetricsRecorder;
use edge_gateway::{Gateway, ShutdownReport};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Headers the echo backend copies from the request it received.
pub const SEEN_HOST: &str = "x-seen-host";
pub const SEEN_FORWARDED_FOR: &str = "x-seen-forwarded-for";
pub const SEEN_REQUEST_ID: &str = "x-seen-request-id";
pub const SEEN_QUERY: &str = "x-seen-query";

/// Start an axum backend on an ephemeral port.
///
/// - `GET /drivers/{id}` → `{"id": <id>}`
/// - `GET /records` → `records`
/// - `GET /slow` → sleeps 2s, then `slow`
///
/// Driver responses carry `x-seen-*` headers describing the request.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/drivers/{id}", get(driver))
        .route("/records", get(|| async { "records" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "slow"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn driver(Path(id): Path<u64>, headers: HeaderMap, uri: axum::http::Uri) -> impl IntoResponse {
    let mut seen = HeaderMap::new();
    copy_header(&headers, &mut seen, "host", SEEN_HOST);
    copy_header(&headers, &mut seen, "x-forwarded-for", SEEN_FORWARDED_FOR);
    copy_header(&headers, &mut seen, "x-request-id", SEEN_REQUEST_ID);
    if let Some(query) = uri.query() {
        if let Ok(value) = HeaderValue::from_str(query) {
            seen.insert(SEEN_QUERY, value);
        }
    }
    (seen, Json(json!({ "id": id })))
}

fn copy_header(from: &HeaderMap, to: &mut HeaderMap, name: &str, as_name: &'static str) {
    if let Some(value) = from.get(name) {
        to.insert(HeaderName::from_static(as_name), value.clone());
    }
}

/// Start a raw TCP backend that writes a fixed HTTP/1.1 response.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that sends headers and the start of a body, then
/// stalls without finishing it.
pub async fn start_stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial";
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

/// Start a backend that accepts connections and closes them without
/// answering.
pub async fn start_resetting_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Gateway config bound to ephemeral ports with the given routes.
pub fn test_config(routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.metrics.bind_address = "127.0.0.1:0".into();
    config.timeouts.request_ms = 1_000;
    config.timeouts.connect_ms = 200;
    config.shutdown.delay_ms = 2_000;
    config.routes = routes;
    config
}

/// A gateway running in the background.
pub struct TestGateway {
    pub primary: SocketAddr,
    pub metrics: SocketAddr,
    pub readiness: ReadinessGate,
    pub recorder: MetricsRecorder,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<ShutdownReport>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.primary, path)
    }

    pub fn metrics_url(&self, path: &str) -> String {
        format!("http://{}{}", self.metrics, path)
    }

    /// Deliver the termination signal.
    pub fn signal(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the shutdown sequence to finish.
    pub async fn join(mut self) -> ShutdownReport {
        self.signal();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("shutdown did not finish")
            .expect("gateway task panicked")
            .expect("gateway failed")
    }
}

/// Build and start a gateway.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    spawn(Gateway::build(config).expect("gateway builds")).await
}

/// Start an already built gateway.
pub async fn spawn(gateway: Gateway) -> TestGateway {
    let readiness = gateway.readiness();
    let recorder = gateway.metrics();
    let bound = gateway.bind().await.expect("listeners bind");
    let primary = bound.primary_addr();
    let metrics = bound.metrics_addr();

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(bound.serve(async move {
        let _ = rx.await;
    }));

    TestGateway {
        primary,
        metrics,
        readiness,
        recorder,
        shutdown: Some(tx),
        task,
    }
}

/// HTTP client without connection pooling, so shutdown tests see fresh
/// connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
