//! CORS overlay.
//!
//! Answers preflight requests itself and decorates every other response
//! with the permissive CORS headers browsers expect from the public API.

use tower::util::BoxCloneSyncService;
use tower::Layer;
use tower_http::cors::CorsLayer;

use super::{Capability, Middleware, RouteService};

#[derive(Debug, Clone)]
pub struct CorsOverlay {
    layer: CorsLayer,
}

impl CorsOverlay {
    /// Any origin, method and header.
    pub fn permissive() -> Self {
        Self {
            layer: CorsLayer::permissive(),
        }
    }

    pub fn with_layer(layer: CorsLayer) -> Self {
        Self { layer }
    }
}

impl Middleware for CorsOverlay {
    fn capability(&self) -> Capability {
        Capability::Cors
    }

    fn wrap(&self, inner: RouteService) -> RouteService {
        BoxCloneSyncService::new(self.layer.layer(inner))
    }
}
