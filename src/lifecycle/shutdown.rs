//! Ordered graceful shutdown.
//!
//! # Sequence
//! ```text
//! termination signal
//!     → readiness flips to draining (/ready answers 503)
//!     → optional grace pause so the orchestrator notices
//!     → primary listener: stop accepting, drain in-flight requests
//!     → optional final scrape window on the metrics listener
//!     → metrics listener: stop accepting, drain
//! ```
//!
//! # Design Decisions
//! - One overall deadline (`shutdown.delay_ms`) bounds the whole sequence
//! - A listener still draining at the deadline is aborted together with
//!   every connection it still holds
//! - Listeners speak HTTP/1.1 and own their connections
//! - The metrics listener outlives the primary so in-flight latencies reach
//!   one more scrape

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use futures_util::future::{self, Either};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::config::ShutdownConfig;
use crate::health::ReadinessGate;

/// Where the gateway is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    SignalReceived,
    Draining,
    Stopped,
}

/// How a listener finished draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request completed before the deadline.
    Graceful,
    /// The deadline hit first; remaining work was abandoned.
    Forced,
    /// The server task ended with an error.
    Failed(String),
}

/// One completed step of the sequence, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownStep {
    ReadinessFlipped,
    PrimaryStopped(DrainOutcome),
    FinalScrape { served: bool },
    MetricsStopped(DrainOutcome),
}

/// What happened during shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub steps: Vec<ShutdownStep>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// True when any listener had to be aborted at the deadline.
    pub fn forced(&self) -> bool {
        self.steps.iter().any(|step| {
            matches!(
                step,
                ShutdownStep::PrimaryStopped(DrainOutcome::Forced)
                    | ShutdownStep::MetricsStopped(DrainOutcome::Forced)
            )
        })
    }
}

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// An accept loop and the connections it owns.
///
/// Connections live in a `JoinSet` inside the serve task, so aborting the
/// task at the drain deadline also aborts every connection still open.
pub struct ListenerHandle {
    name: &'static str,
    addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Serve `router` on `listener` until drained.
    pub fn spawn(name: &'static str, listener: TcpListener, router: Router) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let task = tokio::spawn(accept_loop(name, listener, router, token.clone()));

        tracing::info!(listener = name, address = %addr, "Listening for connections");
        Ok(Self {
            name,
            addr,
            token,
            task,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for in-flight requests, at most until
    /// `deadline`. Connections still open at the deadline are aborted
    /// before this returns.
    pub async fn drain(mut self, deadline: Instant) -> DrainOutcome {
        self.token.cancel();

        let outcome = match tokio::time::timeout_at(deadline, &mut self.task).await {
            Ok(Ok(())) => DrainOutcome::Graceful,
            Ok(Err(e)) => DrainOutcome::Failed(e.to_string()),
            Err(_) => {
                self.task.abort();
                // Resolves once the task, and with it the JoinSet, is dropped.
                let _ = (&mut self.task).await;
                DrainOutcome::Forced
            }
        };

        match &outcome {
            DrainOutcome::Graceful => {
                tracing::info!(listener = self.name, "Listener drained");
            }
            DrainOutcome::Forced => {
                tracing::warn!(listener = self.name, "Drain deadline reached, connections aborted");
            }
            DrainOutcome::Failed(error) => {
                tracing::error!(listener = self.name, error = %error, "Listener failed");
            }
        }
        outcome
    }
}

async fn accept_loop(name: &'static str, listener: TcpListener, router: Router, token: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, router.clone(), token.clone()));
                }
                Err(e) => {
                    tracing::warn!(listener = name, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    tracing::debug!(listener = name, open = connections.len(), "Stopped accepting, draining connections");
    while connections.join_next().await.is_some() {}
}

/// Serve one HTTP/1.1 connection. On cancellation the connection finishes
/// its current request and closes.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, router: Router, token: CancellationToken) {
    let service = router.map_request(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        req.map(Body::new)
    });

    let mut conn = pin!(http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service)));
    let cancelled = pin!(token.cancelled_owned());

    let result = match future::select(conn.as_mut(), cancelled).await {
        Either::Left((result, _)) => result,
        Either::Right(((), mut conn)) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Runs the shutdown sequence once.
#[derive(Debug)]
pub struct ShutdownSequencer {
    readiness: ReadinessGate,
    settings: ShutdownConfig,
    scrapes: watch::Receiver<u64>,
    phase: watch::Sender<ShutdownPhase>,
}

impl ShutdownSequencer {
    pub fn new(readiness: ReadinessGate, settings: ShutdownConfig, scrapes: watch::Receiver<u64>) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            readiness,
            settings,
            scrapes,
            phase,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Wait for `signal`, then take both listeners down in order.
    pub async fn run(
        mut self,
        signal: impl Future<Output = ()>,
        primary: ListenerHandle,
        metrics: ListenerHandle,
    ) -> ShutdownReport {
        signal.await;
        self.set_phase(ShutdownPhase::SignalReceived);

        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.settings.delay_ms);
        let mut steps = Vec::with_capacity(4);

        tracing::info!(
            delay_ms = self.settings.delay_ms,
            "Termination signal received, shutting down"
        );

        if self.readiness.mark_draining() {
            steps.push(ShutdownStep::ReadinessFlipped);
        }
        self.set_phase(ShutdownPhase::Draining);

        if self.settings.readiness_grace_ms > 0 {
            let grace = started + Duration::from_millis(self.settings.readiness_grace_ms);
            tokio::time::sleep_until(grace.min(deadline)).await;
        }

        steps.push(ShutdownStep::PrimaryStopped(primary.drain(deadline).await));

        if self.settings.final_scrape {
            self.scrapes.borrow_and_update();
            let served = matches!(
                tokio::time::timeout_at(deadline, self.scrapes.changed()).await,
                Ok(Ok(()))
            );
            if !served {
                tracing::warn!("No scrape arrived before the deadline");
            }
            steps.push(ShutdownStep::FinalScrape { served });
        }

        steps.push(ShutdownStep::MetricsStopped(metrics.drain(deadline).await));

        self.set_phase(ShutdownPhase::Stopped);
        let report = ShutdownReport {
            steps,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            forced = report.forced(),
            "Shutdown complete"
        );
        report
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
    }
}
