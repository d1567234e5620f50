use crate::{
    gate::{Permission, Principal, Role},
    models::User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, RwLock},
};
use uuid::Uuid;

/// AccessRepository
///
/// Read side of the identity/role/permission store plus the two profile
/// writes exposed by /profile. Grants are administered elsewhere; this
/// service never writes roles or permissions.
///
/// Shared as `Arc<dyn AccessRepository>` across Axum tasks, hence
/// `Send + Sync` and `async_trait`.
#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn roles_of(&self, user_id: Uuid) -> Result<BTreeSet<Role>, sqlx::Error>;
    /// Permissions attached directly to the user, not through a role.
    async fn permissions_of(&self, user_id: Uuid) -> Result<BTreeSet<Permission>, sqlx::Error>;
    async fn permissions_of_role(&self, role: &Role) -> Result<BTreeSet<Permission>, sqlx::Error>;

    /// Permissions granted by any of the user's roles. Stores that can join
    /// the pivot tables should override this; the default asks per role.
    async fn role_permissions_of(&self, user_id: Uuid) -> Result<BTreeSet<Permission>, sqlx::Error> {
        let mut permissions = BTreeSet::new();
        for role in &self.roles_of(user_id).await? {
            permissions.extend(self.permissions_of_role(role).await?);
        }
        Ok(permissions)
    }

    // --- Profile ---
    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<Option<User>, sqlx::Error>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    /// load_principal
    ///
    /// Builds the per-request snapshot: the user, its roles, its direct
    /// permissions and the permissions of its roles. `None` when the
    /// user does not exist.
    async fn load_principal(&self, id: Uuid) -> Result<Option<Principal>, sqlx::Error> {
        let Some(user) = self.get_user(id).await? else {
            return Ok(None);
        };

        let roles = self.roles_of(id).await?;
        let permissions = self.permissions_of(id).await?;
        let role_permissions = self.role_permissions_of(id).await?;

        Ok(Some(Principal {
            identity: user.identity(),
            roles,
            permissions,
            role_permissions,
        }))
    }
}

/// RepositoryState
///
/// The concrete type used to share the store across the application state.
pub type RepositoryState = Arc<dyn AccessRepository>;

/// PostgresRepository
///
/// `AccessRepository` over the role/permission schema used by Laravel's
/// Spatie package (`model_has_roles`, `model_has_permissions`,
/// `role_has_permissions`), so an existing database can be pointed at
/// this service unchanged.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessRepository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, name, email, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn roles_of(&self, user_id: Uuid) -> Result<BTreeSet<Role>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM roles r
            JOIN model_has_roles mr ON mr.role_id = r.id
            WHERE mr.model_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(Role).collect())
    }

    async fn permissions_of(&self, user_id: Uuid) -> Result<BTreeSet<Permission>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM permissions p
            JOIN model_has_permissions mp ON mp.permission_id = p.id
            WHERE mp.model_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(Permission).collect())
    }

    async fn permissions_of_role(&self, role: &Role) -> Result<BTreeSet<Permission>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM permissions p
            JOIN role_has_permissions rp ON rp.permission_id = p.id
            JOIN roles r ON r.id = rp.role_id
            WHERE r.name = $1
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(Permission).collect())
    }

    async fn role_permissions_of(&self, user_id: Uuid) -> Result<BTreeSet<Permission>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM permissions p
            JOIN role_has_permissions rp ON rp.permission_id = p.id
            JOIN model_has_roles mr ON mr.role_id = rp.role_id
            WHERE mr.model_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(Permission).collect())
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET name = $2 WHERE id = $1 RETURNING id, name, email, created_at",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    /// Grant rows go with the user (ON DELETE CASCADE on the pivot tables).
    async fn delete_user(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Default)]
struct Grants {
    users: HashMap<Uuid, User>,
    user_roles: HashMap<Uuid, BTreeSet<Role>>,
    user_permissions: HashMap<Uuid, BTreeSet<Permission>>,
    role_permissions: HashMap<Role, BTreeSet<Permission>>,
}

/// InMemoryRepository
///
/// `AccessRepository` held in process memory. Used by the test suites and by
/// `SEED_DEMO=1` local runs; grants are set up with the `grant_*` builders.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<Grants>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixture served by `SEED_DEMO=1`: alice is an admin (and admins may
    /// edit orders), bob has no grants.
    pub fn demo() -> Self {
        Self::new()
            .with_user(DEMO_ALICE, "alice", "alice@example.com")
            .with_user(DEMO_BOB, "bob", "bob@example.com")
            .grant_role(DEMO_ALICE, "admin")
            .grant_role_permission("admin", "edit orders")
    }

    pub fn with_user(self, id: Uuid, name: &str, email: &str) -> Self {
        self.write().users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                email: email.to_string(),
                created_at: Utc::now(),
            },
        );
        self
    }

    pub fn grant_role(self, user_id: Uuid, role: &str) -> Self {
        self.write()
            .user_roles
            .entry(user_id)
            .or_default()
            .insert(Role::new(role));
        self
    }

    pub fn grant_permission(self, user_id: Uuid, permission: &str) -> Self {
        self.write()
            .user_permissions
            .entry(user_id)
            .or_default()
            .insert(Permission::new(permission));
        self
    }

    pub fn grant_role_permission(self, role: &str, permission: &str) -> Self {
        self.write()
            .role_permissions
            .entry(Role::new(role))
            .or_default()
            .insert(Permission::new(permission));
        self
    }

    /// Revokes a role, e.g. to model an administrator acting mid-session.
    pub fn revoke_role(&self, user_id: Uuid, role: &str) {
        if let Some(roles) = self.write().user_roles.get_mut(&user_id) {
            roles.remove(&Role::new(role));
        }
    }

    // A poisoned lock only means another test thread panicked mid-write; the
    // maps are still structurally valid.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Grants> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Grants> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

pub const DEMO_ALICE: Uuid = Uuid::from_u128(0xA11CE);
pub const DEMO_BOB: Uuid = Uuid::from_u128(0xB0B);

#[async_trait]
impl AccessRepository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn roles_of(&self, user_id: Uuid) -> Result<BTreeSet<Role>, sqlx::Error> {
        Ok(self.read().user_roles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn permissions_of(&self, user_id: Uuid) -> Result<BTreeSet<Permission>, sqlx::Error> {
        Ok(self
            .read()
            .user_permissions
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn permissions_of_role(&self, role: &Role) -> Result<BTreeSet<Permission>, sqlx::Error> {
        Ok(self
            .read()
            .role_permissions
            .get(role)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> Result<Option<User>, sqlx::Error> {
        let mut grants = self.write();
        Ok(grants.users.get_mut(&id).map(|user| {
            user.name = name.to_string();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut grants = self.write();
        grants.user_roles.remove(&id);
        grants.user_permissions.remove(&id);
        Ok(grants.users.remove(&id).is_some())
    }
}
