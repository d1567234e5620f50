use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Orders Router Module
///
/// Routes guarded by the `edit orders` permission, granted either directly
/// or through a role.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        // GET /orders/edit
        .route("/orders/edit", get(handlers::edit_orders))
}
