use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without signing in. The gate lets these through
/// without resolving an identity; the landing page resolves one itself to
/// greet signed-in users.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Landing page.
        .route("/", get(handlers::welcome))
        // GET /health
        // Liveness check for the load balancer. Returns "ok" without touching
        // the store, with or without credentials.
        .route("/health", get(|| async { "ok" }))
}
