//! Session authority and its collaborators.
//!
//! The authority owns the single current [`Session`](gate_protocol::Session)
//! of the client. The hosted platform is reached through [`AuthBackend`] and
//! the persisted copy through [`SessionStore`].

/// Seam to the hosted platform's auth endpoints.
pub mod backend;
/// Current-session ownership, single-flight refresh and lifecycle events.
pub mod authority;
/// Persisted session storage.
pub mod store;

pub use authority::{AuthPhase, SessionAuthority};
pub use backend::AuthBackend;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
