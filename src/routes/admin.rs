use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Routes restricted to holders of the `admin` role. The role check is done
/// by the gate middleware before any handler here runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // Admin dashboard with the link to order management.
        .route("/admin", get(handlers::admin_dashboard))
}
