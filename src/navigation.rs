//! Navigation intents returned by the guard and the gateway.
//!
//! SYSTEM CONTEXT
//! ==============
//! Neither the guard nor the gateway navigates on its own. They return a
//! [`Navigation`] and the composition root (the CLI here, a router in a UI
//! shell) decides how to carry it out.

use std::fmt;

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Continue to the requested destination.
    Proceed,
    /// Switch to another route inside the app.
    Redirect(String),
    /// Leave the app for an absolute URL (external auth surface).
    External(String),
}

impl Navigation {
    /// Destination path or URL, if this is a redirect of either kind.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Proceed => None,
            Self::Redirect(target) | Self::External(target) => Some(target),
        }
    }

    #[must_use]
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => f.write_str("proceed"),
            Self::Redirect(target) => write!(f, "redirect {target}"),
            Self::External(target) => write!(f, "external {target}"),
        }
    }
}

/// Where unauthenticated users are sent to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectStrategy {
    /// Separate auth service; the callback is the absolute URL the user wanted.
    ExternalService { service_url: String },
    /// In-app login route; the callback is the path the user wanted.
    InternalLogin { login_path: String },
}

impl RedirectStrategy {
    /// Sign-in intent for a user heading to `destination` (path plus query).
    #[must_use]
    pub fn sign_in(&self, app_origin: &str, destination: &str) -> Navigation {
        match self {
            Self::ExternalService { service_url } => {
                let callback = format!("{app_origin}{destination}");
                Navigation::External(format!("{service_url}/?redirect={}", urlencoding::encode(&callback)))
            }
            Self::InternalLogin { login_path } => {
                Navigation::Redirect(format!("{login_path}?redirect={}", urlencoding::encode(destination)))
            }
        }
    }

    /// Re-authentication intent after a session expires mid-request.
    ///
    /// `location` is the route the user was on. With it the intent carries
    /// the same `redirect` parameter as [`RedirectStrategy::sign_in`];
    /// without it the bare sign-in surface is returned.
    #[must_use]
    pub fn reauthenticate(&self, app_origin: &str, location: Option<&str>) -> Navigation {
        if let Some(location) = location {
            return self.sign_in(app_origin, location);
        }
        match self {
            Self::ExternalService { service_url } => Navigation::External(format!("{service_url}/")),
            Self::InternalLogin { login_path } => Navigation::Redirect(login_path.clone()),
        }
    }
}

#[cfg(test)]
#[path = "navigation_test.rs"]
mod tests;
