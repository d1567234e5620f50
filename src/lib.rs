use axum::{
    Router,
    extract::{FromRef, MatchedPath, Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod repository;

// Routers split by the requirement their routes carry, plus the route table.
pub mod routes;
use routes::{RouteTable, admin, authenticated, orders, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gate::{Decision, DenyReason, RouteRequirement, check};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the service, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::welcome, handlers::dashboard, handlers::admin_dashboard,
        handlers::edit_orders, handlers::get_profile, handlers::update_profile,
        handlers::delete_profile
    ),
    components(
        schemas(
            models::WelcomePage, models::DashboardPage, models::AdminDashboard,
            models::ProfileView, models::UpdateProfileRequest, models::ErrorBody,
            gate::Role, gate::Permission,
        )
    ),
    tags(
        (name = "access-gate", description = "Role/permission gated routes")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cheaply clonable state handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Identity/role/permission store.
    pub repo: RepositoryState,
    /// Configuration, immutable after startup.
    pub config: AppConfig,
    /// Route requirements, fixed at startup.
    pub routes: Arc<RouteTable>,
}

impl AppState {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            config,
            routes: Arc::new(RouteTable::standard()),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// access_middleware
///
/// Runs the access gate in front of every application route.
///
/// 1. Looks up the matched route's requirement in the `RouteTable`.
/// 2. `Public` routes are passed straight through without touching the
///    store. Handlers that want the visitor's name take `Option<AuthUser>`.
/// 3. Otherwise resolves the caller's principal. Lookup failures of any kind
///    (bad token, unknown user, store outage) count as "not signed in".
/// 4. Calls `gate::check`; a denial is answered with 401/403 and the handler
///    never runs. On allow, the principal is stored in the request
///    extensions for the `AuthUser` extractor.
async fn access_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(route) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
    else {
        tracing::error!(uri = %request.uri(), "request reached the gate without a matched route");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let Some(requirement) = state.routes.requirement(request.method(), &route).cloned() else {
        // Registered with the router but missing from the table.
        tracing::error!(method = %request.method(), route = %route, "route has no access requirement");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if requirement == RouteRequirement::Public {
        tracing::debug!(route = %route, requirement = %requirement, "access allowed");
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();

    let principal = match auth::resolve_principal(&parts, &state.repo, &state.config).await {
        Ok(principal) => Some(principal),
        Err(auth::AuthError::MissingCredentials) => None,
        Err(e) => {
            tracing::debug!(route = %route, "identity lookup failed: {}", e);
            None
        }
    };

    match gate::check(principal.as_ref(), &requirement) {
        Decision::Allow => {
            tracing::debug!(route = %route, requirement = %requirement, "access allowed");
            if let Some(principal) = principal {
                parts.extensions.insert(principal);
            }
            next.run(Request::from_parts(parts, body)).await
        }
        Decision::Deny(reason) => {
            tracing::warn!(
                route = %route,
                requirement = %requirement,
                user_id = ?principal.as_ref().map(|p| p.identity.id),
                "access denied: {}",
                reason
            );
            reason.into_response()
        }
    }
}

/// create_router
///
/// Assembles the routers, attaches the gate to every application route, and
/// wraps everything in the request-id/tracing/CORS stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Application routes: every one of them passes through the gate.
    let gated = Router::new()
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(admin::admin_routes())
        .merge(orders::order_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            access_middleware,
        ));

    let base_router = Router::new()
        // Documentation is public and not part of the route table.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(gated)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
