use access_gate::{
    gate::{Permission, Role},
    repository::{AccessRepository, PostgresRepository},
};
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// These tests need a live Postgres: set DATABASE_URL and run with
// `cargo test -- --ignored`.

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_test_user(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(format!("{}-{}@test.com", name, id.simple()))
        .execute(pool)
        .await
        .expect("Failed to create test user");
    id
}

async fn assign_role(pool: &PgPool, user_id: Uuid, role: &str) {
    sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO model_has_roles (role_id, model_id) SELECT id, $2 FROM roles WHERE name = $1",
    )
    .bind(role)
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn give_permission(pool: &PgPool, user_id: Uuid, permission: &str) {
    sqlx::query("INSERT INTO permissions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(permission)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO model_has_permissions (permission_id, model_id) SELECT id, $2 FROM permissions WHERE name = $1",
    )
    .bind(permission)
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn grant_role_permission(pool: &PgPool, role: &str, permission: &str) {
    sqlx::query("INSERT INTO permissions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(permission)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        r#"
        INSERT INTO role_has_permissions (permission_id, role_id)
        SELECT p.id, r.id FROM permissions p, roles r WHERE p.name = $2 AND r.name = $1
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(role)
    .bind(permission)
    .execute(pool)
    .await
    .unwrap();
}

// --- Tests ---

#[test]
#[ignore]
async fn test_admin_role_carries_seeded_edit_orders() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let alice = create_test_user(&ctx.pool, "alice").await;
    assign_role(&ctx.pool, alice, "admin").await;

    let principal = repo.load_principal(alice).await.unwrap().unwrap();

    assert!(principal.has_role(&Role::new("admin")));
    assert!(principal.permissions.is_empty());
    assert!(principal.has_permission(&Permission::new("edit orders")));
}

#[test]
#[ignore]
async fn test_direct_permission_without_role() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let clerk = create_test_user(&ctx.pool, "clerk").await;
    give_permission(&ctx.pool, clerk, "edit orders").await;

    let principal = repo.load_principal(clerk).await.unwrap().unwrap();

    assert!(principal.roles.is_empty());
    assert!(principal.has_permission(&Permission::new("edit orders")));
}

#[test]
#[ignore]
async fn test_user_without_grants() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let bob = create_test_user(&ctx.pool, "bob").await;

    let principal = repo.load_principal(bob).await.unwrap().unwrap();

    assert!(principal.roles.is_empty());
    assert!(principal.effective_permissions().is_empty());
    assert!(repo.load_principal(Uuid::new_v4()).await.unwrap().is_none());
}

#[test]
#[ignore]
async fn test_rename_and_delete_cascade() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&ctx.pool, "temp").await;
    assign_role(&ctx.pool, user, "admin").await;

    let renamed = repo.update_user_name(user, "Temp User").await.unwrap().unwrap();
    assert_eq!(renamed.name, "Temp User");

    assert!(repo.delete_user(user).await.unwrap());
    assert!(!repo.delete_user(user).await.unwrap());
    assert!(repo.roles_of(user).await.unwrap().is_empty());
}

#[test]
#[ignore]
async fn test_role_permissions_joined_across_roles() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&ctx.pool, "lead").await;
    assign_role(&ctx.pool, user, "admin").await;
    assign_role(&ctx.pool, user, "shift lead").await;
    grant_role_permission(&ctx.pool, "shift lead", "edit orders").await;
    grant_role_permission(&ctx.pool, "shift lead", "close till").await;

    let joined = repo.role_permissions_of(user).await.unwrap();

    // "edit orders" comes from both roles and appears once.
    let names: Vec<&str> = joined.iter().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["close till", "edit orders"]);

    let mut per_role = std::collections::BTreeSet::new();
    for role in &repo.roles_of(user).await.unwrap() {
        per_role.extend(repo.permissions_of_role(role).await.unwrap());
    }
    assert_eq!(joined, per_role);
}
