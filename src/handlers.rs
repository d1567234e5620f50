use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    gate::Role,
    models::{AdminDashboard, DashboardPage, ProfileView, UpdateProfileRequest, WelcomePage},
    routes::ADMIN_ROLE,
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

const MAX_NAME_LEN: usize = 255;

// --- Handlers ---

/// welcome
///
/// [Public Route] Landing page. Mentions the visitor's name when the request
/// carries valid credentials; anything else is served as anonymous.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Landing page", body = WelcomePage))
)]
pub async fn welcome(user: Option<AuthUser>) -> Json<WelcomePage> {
    Json(WelcomePage {
        message: "Welcome".to_string(),
        signed_in_as: user.map(|AuthUser(p)| p.identity.name),
    })
}

/// dashboard
///
/// [Authenticated Route] The signed-in user's dashboard.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = DashboardPage),
        (status = 401, description = "Not signed in", body = crate::models::ErrorBody)
    )
)]
pub async fn dashboard(AuthUser(principal): AuthUser) -> Json<DashboardPage> {
    Json(DashboardPage {
        greeting: format!("You're logged in, {}!", principal.identity.name),
        roles: principal.roles.into_iter().collect(),
    })
}

/// admin_dashboard
///
/// [Admin Route] Admin landing page. The gate has already required the
/// admin role; `full_access` reflects the same check for the page itself.
#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Admin dashboard", body = AdminDashboard),
        (status = 401, description = "Not signed in", body = crate::models::ErrorBody),
        (status = 403, description = "Missing admin role", body = crate::models::ErrorBody)
    )
)]
pub async fn admin_dashboard(AuthUser(principal): AuthUser) -> Json<AdminDashboard> {
    Json(AdminDashboard {
        heading: "Admin Dashboard".to_string(),
        welcome: format!("Welcome Admin: {}", principal.identity.name),
        full_access: principal.has_role(&Role::new(ADMIN_ROLE)),
        manage_orders_url: "/orders/edit".to_string(),
        generated_at: Utc::now(),
    })
}

/// edit_orders
///
/// [Permission Route] Order editing page, behind `edit orders`.
#[utoipa::path(
    get,
    path = "/orders/edit",
    responses(
        (status = 200, description = "Order editor", body = String),
        (status = 401, description = "Not signed in", body = crate::models::ErrorBody),
        (status = 403, description = "Missing permission", body = crate::models::ErrorBody)
    )
)]
pub async fn edit_orders() -> &'static str {
    "Edit Orders Page"
}

/// get_profile
///
/// [Authenticated Route] The caller's identity and effective grants.
#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "Profile", body = ProfileView))
)]
pub async fn get_profile(AuthUser(principal): AuthUser) -> Json<ProfileView> {
    Json(ProfileView::from(&principal))
}

/// update_profile
///
/// [Authenticated Route] Renames the caller. Grants are untouched.
#[utoipa::path(
    patch,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = ProfileView),
        (status = 404, description = "User vanished", body = crate::models::ErrorBody),
        (status = 422, description = "Invalid name", body = crate::models::ErrorBody)
    )
)]
pub async fn update_profile(
    AuthUser(mut principal): AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }

    let user = state
        .repo
        .update_user_name(principal.identity.id, name)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    tracing::info!(user_id = %user.id, "profile renamed");
    principal.identity = user.identity();
    Ok(Json(ProfileView::from(&principal)))
}

/// delete_profile
///
/// [Authenticated Route] Deletes the caller's account. Later requests with
/// the same credentials resolve to no identity.
#[utoipa::path(
    delete,
    path = "/profile",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = crate::models::ErrorBody)
    )
)]
pub async fn delete_profile(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    if state.repo.delete_user(principal.identity.id).await? {
        tracing::info!(user_id = %principal.identity.id, "profile deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("user"))
    }
}
