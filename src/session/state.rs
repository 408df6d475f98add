//! Session snapshot and user profile.
//!
//! SYSTEM CONTEXT
//! ==============
//! Route guards and admin screens read these predicates to decide what the
//! signed-in user may see. Everything here is pure; the network side lives
//! in [`super::Session`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Admin scope granting access to every organization.
pub const ADMIN_ALL: &str = "all";

/// Authenticated user as returned by `GET /api/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub org: String,
    /// Organization ids the user administers, or [`ADMIN_ALL`].
    #[serde(rename = "admin", alias = "admin_scopes", default)]
    pub admin_scopes: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl UserProfile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    #[must_use]
    pub fn is_admin_for_all(&self) -> bool {
        self.admin_scopes.contains(ADMIN_ALL)
    }
}

/// Point-in-time view of the session, broadcast on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    /// An auth check or login is in flight.
    pub loading: bool,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(UserProfile::is_admin_for_all)
    }

    /// Admin scopes of the current user, empty when signed out.
    #[must_use]
    pub fn admin_orgs(&self) -> Vec<String> {
        self.user
            .as_ref()
            .map(|u| u.admin_scopes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Admin of everything, or of `org_id` when given.
    #[must_use]
    pub fn has_admin_access(&self, org_id: Option<&str>) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        if user.is_admin_for_all() {
            return true;
        }
        org_id.is_some_and(|org| user.admin_scopes.contains(org))
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.user.as_ref().is_some_and(|u| u.roles.contains(role))
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
