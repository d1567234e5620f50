use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::gate::{Identity, Permission, Principal, Role};

// --- Stored Records ---

/// User
///
/// A row of the `users` table. The display name is what the dashboards greet.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

// --- Request Payloads ---

/// UpdateProfileRequest
///
/// Input payload for PATCH /profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[schema(example = "Alice Liddell")]
    pub name: String,
}

// --- Responses ---

/// WelcomePage
///
/// Output of the public landing route (GET /).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WelcomePage {
    pub message: String,
    /// Present when the visitor is signed in.
    pub signed_in_as: Option<String>,
}

/// DashboardPage
///
/// Output of GET /dashboard, available to any signed-in identity.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardPage {
    pub greeting: String,
    pub roles: Vec<Role>,
}

/// AdminDashboard
///
/// Output of GET /admin.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminDashboard {
    pub heading: String,
    pub welcome: String,
    /// True when the viewer holds the admin role.
    pub full_access: bool,
    /// Link to the order management page.
    pub manage_orders_url: String,
    #[ts(type = "string")]
    pub generated_at: DateTime<Utc>,
}

/// ProfileView
///
/// Output of GET/PATCH /profile: the identity plus its current grants.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileView {
    pub id: Uuid,
    pub name: String,
    pub roles: Vec<Role>,
    /// Direct and role-derived permissions, deduplicated and sorted.
    pub permissions: Vec<Permission>,
}

impl From<&Principal> for ProfileView {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.identity.id,
            name: principal.identity.name.clone(),
            roles: principal.roles.iter().cloned().collect(),
            permissions: principal.effective_permissions().into_iter().collect(),
        }
    }
}

/// ErrorBody
///
/// JSON body returned with every 4xx/5xx produced by this service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. "missing_role".
    pub error: String,
    pub message: String,
}
