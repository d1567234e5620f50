use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role
///
/// A named label attached to identities (e.g. "admin"). Roles are plain set
/// members: there is no hierarchy and no implicit inheritance between roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(transparent)]
pub struct Role(pub String);

/// Permission
///
/// A named capability (e.g. "edit orders"). Granted to an identity directly
/// or through one of its roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(transparent)]
pub struct Permission(pub String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity
///
/// The authenticated subject of a request. Created and destroyed by the
/// external identity provider; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
}

/// Principal
///
/// Read-only snapshot of an identity and its grants, taken once per request.
/// Concurrent changes in the store are not observed by a snapshot that has
/// already been loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: Identity,
    pub roles: BTreeSet<Role>,
    /// Permissions attached to the identity itself.
    pub permissions: BTreeSet<Permission>,
    /// Permissions inherited from the roles above.
    pub role_permissions: BTreeSet<Permission>,
}

impl Principal {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            role_permissions: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(Role::new(role));
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(Permission::new(permission));
        self
    }

    pub fn with_role_permission(mut self, permission: impl Into<String>) -> Self {
        self.role_permissions.insert(Permission::new(permission));
        self
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Direct or role-derived.
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission) || self.role_permissions.contains(permission)
    }

    pub fn effective_permissions(&self) -> BTreeSet<Permission> {
        self.permissions
            .union(&self.role_permissions)
            .cloned()
            .collect()
    }
}

/// RouteRequirement
///
/// The access rule attached to a route when it is registered. `Public` and
/// `Authenticated` are kept apart so that an anonymous visitor can reach
/// public pages but not pages that merely need a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RouteRequirement {
    Public,
    Authenticated,
    RequiresRole(Role),
    RequiresPermission(Permission),
}

impl RouteRequirement {
    pub fn role(name: impl Into<String>) -> Self {
        Self::RequiresRole(Role::new(name))
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::RequiresPermission(Permission::new(name))
    }
}

impl fmt::Display for RouteRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Authenticated => f.write_str("auth"),
            Self::RequiresRole(role) => write!(f, "role:{role}"),
            Self::RequiresPermission(permission) => write!(f, "permission:{permission}"),
        }
    }
}

/// DenyReason
///
/// Why a request was refused. These are outcomes, not failures: the gate
/// returns them inside a `Decision` and never raises them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("authentication required")]
    Unauthenticated,
    #[error("missing role `{0}`")]
    MissingRole(Role),
    #[error("missing permission `{0}`")]
    MissingPermission(Permission),
}

impl DenyReason {
    /// Stable machine-readable tag used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::MissingRole(_) => "missing_role",
            Self::MissingPermission(_) => "missing_permission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// check
///
/// Decides whether `principal` may reach a route declaring `requirement`.
/// Pure and total: no I/O, no shared state, no panics. Identity lookup
/// failures must be mapped to `None` by the caller.
pub fn check(principal: Option<&Principal>, requirement: &RouteRequirement) -> Decision {
    if *requirement == RouteRequirement::Public {
        return Decision::Allow;
    }

    let Some(principal) = principal else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };

    match requirement {
        RouteRequirement::Public | RouteRequirement::Authenticated => Decision::Allow,
        RouteRequirement::RequiresRole(role) if principal.has_role(role) => Decision::Allow,
        RouteRequirement::RequiresRole(role) => Decision::Deny(DenyReason::MissingRole(role.clone())),
        RouteRequirement::RequiresPermission(permission) if principal.has_permission(permission) => {
            Decision::Allow
        }
        RouteRequirement::RequiresPermission(permission) => {
            Decision::Deny(DenyReason::MissingPermission(permission.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn alice() -> Principal {
        Principal::new(identity("alice"))
            .with_role("admin")
            .with_role_permission("edit orders")
    }

    fn bob() -> Principal {
        Principal::new(identity("bob"))
    }

    #[test]
    fn public_routes_admit_anonymous_visitors() {
        assert_eq!(check(None, &RouteRequirement::Public), Decision::Allow);
        assert_eq!(check(Some(&bob()), &RouteRequirement::Public), Decision::Allow);
    }

    #[test]
    fn authenticated_routes_need_an_identity() {
        assert_eq!(
            check(None, &RouteRequirement::Authenticated),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(check(Some(&bob()), &RouteRequirement::Authenticated), Decision::Allow);
    }

    #[test]
    fn admin_role_admits_alice() {
        assert_eq!(check(Some(&alice()), &RouteRequirement::role("admin")), Decision::Allow);
    }

    #[test]
    fn bob_lacks_edit_orders() {
        assert_eq!(
            check(Some(&bob()), &RouteRequirement::permission("edit orders")),
            Decision::Deny(DenyReason::MissingPermission(Permission::new("edit orders")))
        );
    }

    #[test]
    fn anonymous_is_unauthenticated_before_role_check() {
        assert_eq!(
            check(None, &RouteRequirement::role("admin")),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(
            check(None, &RouteRequirement::permission("edit orders")),
            Decision::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn missing_role_names_the_role() {
        assert_eq!(
            check(Some(&bob()), &RouteRequirement::role("admin")),
            Decision::Deny(DenyReason::MissingRole(Role::new("admin")))
        );
    }

    #[test]
    fn roles_are_not_hierarchical() {
        let editor = Principal::new(identity("carol")).with_role("editor");
        assert!(!check(Some(&editor), &RouteRequirement::role("admin")).is_allowed());
        // A permission with the same name as a role does not stand in for it.
        let named = Principal::new(identity("dave")).with_permission("admin");
        assert!(!check(Some(&named), &RouteRequirement::role("admin")).is_allowed());
    }

    #[test]
    fn direct_and_role_permissions_are_unioned() {
        let direct = Principal::new(identity("erin")).with_permission("edit orders");
        let via_role = Principal::new(identity("frank"))
            .with_role("clerk")
            .with_role_permission("edit orders");
        let requirement = RouteRequirement::permission("edit orders");

        assert!(check(Some(&direct), &requirement).is_allowed());
        assert!(check(Some(&via_role), &requirement).is_allowed());
        assert_eq!(
            via_role.effective_permissions(),
            BTreeSet::from([Permission::new("edit orders")])
        );
    }

    #[test]
    fn repeated_checks_agree() {
        let principal = alice();
        let requirements = [
            RouteRequirement::Public,
            RouteRequirement::Authenticated,
            RouteRequirement::role("admin"),
            RouteRequirement::role("auditor"),
            RouteRequirement::permission("edit orders"),
            RouteRequirement::permission("delete orders"),
        ];
        for requirement in &requirements {
            let first = check(Some(&principal), requirement);
            for _ in 0..3 {
                assert_eq!(check(Some(&principal), requirement), first);
            }
        }
    }

    #[test]
    fn concurrent_checks_share_one_snapshot() {
        let principal = alice();
        let requirement = RouteRequirement::permission("edit orders");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| check(Some(&principal), &requirement)))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), Decision::Allow);
            }
        });
    }

    #[test]
    fn deny_reasons_render_for_logs() {
        assert_eq!(DenyReason::Unauthenticated.to_string(), "authentication required");
        assert_eq!(
            DenyReason::MissingPermission(Permission::new("edit orders")).to_string(),
            "missing permission `edit orders`"
        );
        assert_eq!(DenyReason::MissingRole(Role::new("admin")).kind(), "missing_role");
        assert_eq!(RouteRequirement::role("admin").to_string(), "role:admin");
    }
}
