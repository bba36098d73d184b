//! HTTP server setup.
//!
//! # Responsibilities
//! - Build one composed service per route (handler wrapped in its chain)
//! - Create the Axum router: readiness check plus the route dispatcher
//! - Dispatch requests to the matched route's service
//!
//! # Design Decisions
//! - Dispatch happens in the fallback handler: method mismatches are plain
//!   404s, and regex constraints and query predicates stay in our matcher
//! - Route services are built once at startup and cloned per request
//! - The readiness route sits outside every chain

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tower::ServiceExt;

use crate::backend::HandlerRegistry;
use crate::error::ConfigError;
use crate::health::{readiness_handler, ReadinessGate, READINESS_PATH};
use crate::http::middleware::{CorsOverlay, MiddlewareChain, RouteService};
use crate::http::request::MatchedRoute;
use crate::http::response::not_found;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    table: Arc<RouteTable>,
    services: Arc<[RouteService]>,
}

/// The primary listener's application.
pub struct GatewayServer {
    router: Router,
    table: Arc<RouteTable>,
}

impl GatewayServer {
    /// Compose every route's service and build the router.
    pub fn new(
        table: RouteTable,
        registry: &HandlerRegistry,
        chain: &MiddlewareChain,
        readiness: ReadinessGate,
    ) -> Result<Self, ConfigError> {
        let mut services = Vec::with_capacity(table.len());

        for route in table.routes() {
            let handler = registry.build_handler(route.path(), route.backend())?;
            let service = if route.cors() {
                chain
                    .with_overlay(Arc::new(CorsOverlay::permissive()))?
                    .compose(handler)
            } else {
                chain.compose(handler)
            };
            services.push(service);

            tracing::info!(
                method = %route.method(),
                route = %route.template(),
                backend = %route.backend(),
                cors = route.cors(),
                "Route installed"
            );
        }

        let table = Arc::new(table);
        let state = AppState {
            table: Arc::clone(&table),
            services: services.into(),
        };

        let router = Router::new()
            .route(READINESS_PATH, any(readiness_handler).with_state(readiness))
            .fallback(dispatch_handler)
            .with_state(state);

        Ok(Self { router, table })
    }

    /// A handle to the router, ready to hand to a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }
}

async fn dispatch_handler(State(state): State<AppState>, mut req: Request<Body>) -> Response {
    let Some(matched) = state
        .table
        .dispatch(req.method(), req.uri().path(), req.uri().query())
    else {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "No route matched");
        return not_found();
    };

    let Some(service) = state.services.get(matched.route.id()).cloned() else {
        tracing::error!(route = %matched.route, "Route has no service");
        return not_found();
    };

    req.extensions_mut()
        .insert(MatchedRoute::new(matched.route.label(), matched.params));

    match service.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
