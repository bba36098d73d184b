//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated configuration
//! - Bind the primary and metrics listeners
//! - Hand both listeners to the shutdown sequencer
//!
//! # Design Decisions
//! - Fail fast: any build error is fatal and happens before any bind
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::backend::HandlerRegistry;
use crate::config::GatewayConfig;
use crate::error::ConfigError;
use crate::health::ReadinessGate;
use crate::http::{GatewayServer, MiddlewareChain};
use crate::lifecycle::shutdown::{ListenerHandle, ShutdownReport, ShutdownSequencer};
use crate::observability::{metrics_router, MetricsRecorder};
use crate::routing::RouteTable;

/// A fully built gateway, not yet listening.
pub struct Gateway {
    config: GatewayConfig,
    server: GatewayServer,
    readiness: ReadinessGate,
    metrics: MetricsRecorder,
}

impl Gateway {
    /// Build with the default handler registry.
    pub fn build(config: GatewayConfig) -> Result<Self, ConfigError> {
        let registry = HandlerRegistry::with_defaults(&config.timeouts);
        Self::build_with_registry(config, &registry)
    }

    /// Build with a caller-provided registry, e.g. one with extra protocols.
    pub fn build_with_registry(config: GatewayConfig, registry: &HandlerRegistry) -> Result<Self, ConfigError> {
        let table = RouteTable::build(&config.routes, registry)?;
        tracing::info!(routes = table.len(), "Route table built");

        let metrics = MetricsRecorder::new();
        let readiness = ReadinessGate::new();
        let chain = MiddlewareChain::standard(
            Duration::from_millis(config.timeouts.request_ms),
            metrics.clone(),
        );
        let server = GatewayServer::new(table, registry, &chain, readiness.clone())?;

        Ok(Self {
            config,
            server,
            readiness,
            metrics,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn readiness(&self) -> ReadinessGate {
        self.readiness.clone()
    }

    pub fn metrics(&self) -> MetricsRecorder {
        self.metrics.clone()
    }

    /// Router for the primary listener.
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Router for the metrics listener.
    pub fn metrics_router(&self) -> Router {
        metrics_router(&self.config.metrics.path, self.metrics.clone())
    }

    /// Bind both listeners at their configured addresses.
    pub async fn bind(self) -> io::Result<BoundGateway> {
        let primary = TcpListener::bind(&self.config.listener.bind_address).await?;
        let metrics = TcpListener::bind(&self.config.metrics.bind_address).await?;
        self.bind_to(primary, metrics)
    }

    /// Use already bound listeners.
    pub fn bind_to(self, primary: TcpListener, metrics: TcpListener) -> io::Result<BoundGateway> {
        Ok(BoundGateway {
            primary_addr: primary.local_addr()?,
            metrics_addr: metrics.local_addr()?,
            primary,
            metrics,
            gateway: self,
        })
    }
}

/// A gateway with both listeners bound.
pub struct BoundGateway {
    gateway: Gateway,
    primary: TcpListener,
    metrics: TcpListener,
    primary_addr: SocketAddr,
    metrics_addr: SocketAddr,
}

impl BoundGateway {
    pub fn primary_addr(&self) -> SocketAddr {
        self.primary_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn readiness(&self) -> ReadinessGate {
        self.gateway.readiness()
    }

    /// Serve until `signal` resolves, then shut down in order.
    pub async fn serve(self, signal: impl Future<Output = ()>) -> io::Result<ShutdownReport> {
        let metrics_router = self.gateway.metrics_router();
        let primary_router = self.gateway.router();
        let Gateway {
            config,
            readiness,
            metrics,
            ..
        } = self.gateway;

        let sequencer = ShutdownSequencer::new(readiness, config.shutdown.clone(), metrics.scrapes());

        let metrics_listener = ListenerHandle::spawn("metrics", self.metrics, metrics_router)?;
        let primary_listener = ListenerHandle::spawn("primary", self.primary, primary_router)?;

        Ok(sequencer.run(signal, primary_listener, metrics_listener).await)
    }
}
