use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes available to any signed-in identity regardless of roles. Handlers
/// take the `AuthUser` extractor, which reads the principal the gate left in
/// the request extensions.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /dashboard
        // Personal landing page after sign-in.
        .route("/dashboard", get(handlers::dashboard))
        // GET/PATCH/DELETE /profile
        // The caller's own profile. PATCH renames, DELETE removes the user.
        .route(
            "/profile",
            get(handlers::get_profile)
                .patch(handlers::update_profile)
                .delete(handlers::delete_profile),
        )
}
