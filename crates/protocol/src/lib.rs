//! Wire types for the request gateway.
//!
//! This crate contains the serde-serializable types shared by the gateway,
//! its session authority and the contexts that exchange lifecycle events.
//! These types are the shapes of data as they are persisted or broadcast.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small accessors
//! * Backend-agnostic: Tokens are opaque strings, claims are read best-effort
//! * Stable: Changes only when the persisted or broadcast format changes
//!
//! Runtime behavior is built on top of these types in `gate-rs`.

pub mod claims;
pub mod event;
pub mod session;
pub mod stored;

pub use claims::*;
pub use event::*;
pub use session::*;
pub use stored::*;
