//! Navigation guard: decides whether a route transition may proceed.
//!
//! DESIGN
//! ======
//! The guard never navigates. [`NavigationGuard::before_each`] returns a
//! [`Navigation`] and the router (or the CLI) carries it out.
//!
//! Decision order:
//! 1. Authenticated user heading to the login route goes to the landing page.
//! 2. Public routes always proceed.
//! 3. An in-flight login or auth check is awaited through the session's
//!    completion signal. A stored token that has not been validated yet is
//!    validated here.
//! 4. Authenticated proceeds; anything else gets a sign-in intent carrying
//!    the intended destination.
//!
//! CONCURRENCY
//! ===========
//! Two guards racing on the same unvalidated token both call `check_auth`
//! unless one sees the other's loading flag first. The second then waits on
//! the signal instead of issuing its own request.

use crate::config::SessionConfig;
use crate::navigation::{Navigation, RedirectStrategy};
use crate::session::Session;

/// A route transition's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Path plus query, as the user asked for it.
    pub full_path: String,
    pub requires_auth: bool,
}

impl RouteTarget {
    #[must_use]
    pub fn protected(full_path: impl Into<String>) -> Self {
        Self { full_path: full_path.into(), requires_auth: true }
    }

    #[must_use]
    pub fn public(full_path: impl Into<String>) -> Self {
        Self { full_path: full_path.into(), requires_auth: false }
    }

    /// Path without the query string or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        self.full_path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct NavigationGuard {
    session: Session,
    strategy: RedirectStrategy,
    app_origin: String,
    login_path: String,
    landing_path: String,
}

impl NavigationGuard {
    #[must_use]
    pub fn new(session: Session, config: &SessionConfig) -> Self {
        Self {
            session,
            strategy: config.redirect.clone(),
            app_origin: config.app_origin.clone(),
            login_path: config.login_path.clone(),
            landing_path: config.landing_path.clone(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run before every route transition.
    pub async fn before_each(&self, to: &RouteTarget) -> Navigation {
        if to.path() == self.login_path && self.session.is_authenticated() {
            return Navigation::Redirect(self.landing_path.clone());
        }
        if !to.requires_auth {
            return self.proceed(to);
        }

        if self.session.is_loading() {
            self.session.wait_until_settled().await;
        } else if !self.session.is_authenticated() && self.session.token().is_some() {
            self.session.check_auth().await;
        }

        if self.session.is_authenticated() {
            self.proceed(to)
        } else {
            let intent = self.strategy.sign_in(&self.app_origin, &to.full_path);
            tracing::debug!(route = %to.full_path, %intent, "navigation blocked");
            intent
        }
    }

    /// Record `to` as the current location so a mid-request session expiry
    /// sends the user back to it.
    fn proceed(&self, to: &RouteTarget) -> Navigation {
        if to.path() != self.login_path {
            self.session.gateway().set_location(Some(to.full_path.clone()));
        }
        Navigation::Proceed
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
