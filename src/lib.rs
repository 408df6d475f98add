//! Authenticated-session layer for the admin console.
//!
//! ARCHITECTURE
//! ============
//! [`session::Session`] owns the bearer token and user profile and is the
//! only writer of durable token storage during normal operation.
//! [`gateway::HttpGateway`] wraps every outbound call: it attaches the bearer
//! token, and on a 401 it refreshes once and replays the original request.
//! When it refreshes on its own it reports back through
//! [`session::TokenSink`], so the session never drifts from the gateway.
//!
//! [`guard::NavigationGuard`] decides route transitions. Nothing in this crate
//! performs a redirect itself: redirects are returned as
//! [`navigation::Navigation`] values for the composition root to act on.

pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod navigation;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_helpers;

pub use config::SessionConfig;
pub use error::{ApiError, SessionError};
pub use gateway::{ApiResponse, HttpGateway, PendingRequest};
pub use guard::{NavigationGuard, RouteTarget};
pub use navigation::{Navigation, RedirectStrategy};
pub use session::{Session, SessionState, UserProfile};
pub use storage::{DurableStore, FileStore, MemoryStore};
