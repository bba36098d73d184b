//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the Prometheus recorder for the gateway's own metrics
//! - Record per-request latency into `gateway_response_time`
//! - Serve the exposition on the metrics listener and count scrapes
//!
//! # Metrics
//! - `gateway_response_time` (histogram, seconds): labels `path` (route
//!   template) and `status_code`
//!
//! # Design Decisions
//! - Recorder is owned, not installed globally, so several gateways (and
//!   tests) can run in one process without sharing series
//! - Labels are the route template, never the raw path
//! - Buckets double from 0.5ms to ~4s
//! - Scrapes are counted so shutdown can wait for a final one

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::sync::watch;

/// Request latency histogram.
pub const RESPONSE_TIME_HISTOGRAM: &str = "gateway_response_time";

const FIRST_BUCKET_SECS: f64 = 0.5e-3;
const BUCKET_COUNT: i32 = 14;

/// Exponential buckets: 0.5ms × 2^k for k in 0..14.
pub fn latency_buckets() -> Vec<f64> {
    (0..BUCKET_COUNT)
        .map(|k| FIRST_BUCKET_SECS * 2f64.powi(k))
        .collect()
}

/// Handle to the gateway's metric registry. Cheap to clone.
#[derive(Clone)]
pub struct MetricsRecorder {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    scrapes: Arc<watch::Sender<u64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let builder = PrometheusBuilder::new();
        let recorder = match builder.set_buckets_for_metric(
            Matcher::Full(RESPONSE_TIME_HISTOGRAM.to_string()),
            &latency_buckets(),
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                tracing::error!(error = %e, "Invalid histogram buckets, falling back to summaries");
                PrometheusBuilder::new().build_recorder()
            }
        };
        let handle = recorder.handle();
        let recorder = Arc::new(recorder);

        metrics::with_local_recorder(recorder.as_ref(), || {
            metrics::describe_histogram!(
                RESPONSE_TIME_HISTOGRAM,
                Unit::Seconds,
                "Time from chain entry to response headers, per route and status code"
            );
        });

        let (scrapes, _) = watch::channel(0);
        Self {
            recorder,
            handle,
            scrapes: Arc::new(scrapes),
        }
    }

    /// Observe one completed request.
    pub fn record_response(&self, route: &str, status: StatusCode, elapsed: Duration) {
        metrics::with_local_recorder(self.recorder.as_ref(), || {
            metrics::histogram!(
                RESPONSE_TIME_HISTOGRAM,
                "path" => route.to_string(),
                "status_code" => status.as_u16().to_string()
            )
            .record(elapsed.as_secs_f64());
        });
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Render for a scraper and count the scrape.
    pub fn scrape(&self) -> String {
        let body = self.render();
        self.scrapes.send_modify(|count| *count += 1);
        body
    }

    /// Number of scrapes served so far; notifies on every new scrape.
    pub fn scrapes(&self) -> watch::Receiver<u64> {
        self.scrapes.subscribe()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("scrapes", &*self.scrapes.borrow())
            .finish_non_exhaustive()
    }
}

/// Router for the metrics listener.
pub fn metrics_router(path: &str, recorder: MetricsRecorder) -> Router {
    Router::new()
        .route(path, get(scrape_handler))
        .with_state(recorder)
}

async fn scrape_handler(State(recorder): State<MetricsRecorder>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        recorder.scrape(),
    )
}
