//! Router Module Index
//!
//! Routers are split by the requirement their routes carry. The requirement
//! itself is not attached by the sub-routers: every route is looked up in the
//! `RouteTable` below by the gate middleware, so the table is the single
//! place where access rules live.

use axum::http::Method;

use crate::gate::RouteRequirement;

/// Routes open to anonymous visitors.
pub mod public;

/// Routes that need a signed-in identity and nothing more.
pub mod authenticated;

/// Routes restricted to the `admin` role.
pub mod admin;

/// Routes restricted to the `edit orders` permission.
pub mod orders;

pub const ADMIN_ROLE: &str = "admin";
pub const EDIT_ORDERS: &str = "edit orders";

/// One registered route and the rule guarding it.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub method: Method,
    pub path: &'static str,
    pub requirement: RouteRequirement,
}

/// RouteTable
///
/// Built once at startup and shared read-only through `AppState`. Each
/// `(method, path)` appears at most once, so every route has exactly one
/// requirement.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// The application's routes. Keep in step with the sub-routers.
    pub fn standard() -> Self {
        use RouteRequirement::{Authenticated, Public};

        let mut table = Self { entries: Vec::new() };
        table
            .register(Method::GET, "/", Public)
            .register(Method::GET, "/health", Public)
            .register(Method::GET, "/dashboard", Authenticated)
            .register(Method::GET, "/admin", RouteRequirement::role(ADMIN_ROLE))
            .register(Method::GET, "/orders/edit", RouteRequirement::permission(EDIT_ORDERS))
            .register(Method::GET, "/profile", Authenticated)
            .register(Method::PATCH, "/profile", Authenticated)
            .register(Method::DELETE, "/profile", Authenticated);
        table
    }

    /// Adds a route. A second registration for the same method and path
    /// replaces the first rather than adding a competing rule.
    pub fn register(
        &mut self,
        method: Method,
        path: &'static str,
        requirement: RouteRequirement,
    ) -> &mut Self {
        self.entries
            .retain(|entry| !(entry.method == method && entry.path == path));
        self.entries.push(RouteEntry {
            method,
            path,
            requirement,
        });
        self
    }

    /// requirement
    ///
    /// Rule for a matched route. HEAD is answered by GET handlers, so it is
    /// guarded by the GET rule.
    pub fn requirement(&self, method: &Method, path: &str) -> Option<&RouteRequirement> {
        let method = if *method == Method::HEAD { &Method::GET } else { method };
        self.entries
            .iter()
            .find(|entry| entry.method == *method && entry.path == path)
            .map(|entry| &entry.requirement)
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}
