//! Session lifecycle events and the envelope used to share them between
//! execution contexts of the same client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Identifier of one execution context (window, tab, process) of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ctx-{}", self.0)
	}
}

/// Lifecycle transition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
	SignedIn,
	SignedOut,
	TokenRefreshed,
}

impl SessionEventKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::SignedIn => "SIGNED_IN",
			Self::SignedOut => "SIGNED_OUT",
			Self::TokenRefreshed => "TOKEN_REFRESHED",
		}
	}
}

impl fmt::Display for SessionEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Where an event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "context", rename_all = "lowercase")]
pub enum EventSource {
	/// Produced by this context's session authority.
	Local,
	/// Applied in response to another context's event.
	Remote(ContextId),
}

/// A session lifecycle transition carrying the (possibly absent) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
	pub kind: SessionEventKind,
	#[serde(default)]
	pub session: Option<Session>,
	#[serde(default = "local_source")]
	pub source: EventSource,
}

fn local_source() -> EventSource {
	EventSource::Local
}

impl SessionEvent {
	pub fn local(kind: SessionEventKind, session: Option<Session>) -> Self {
		Self {
			kind,
			session,
			source: EventSource::Local,
		}
	}

	pub fn remote(kind: SessionEventKind, session: Option<Session>, origin: ContextId) -> Self {
		Self {
			kind,
			session,
			source: EventSource::Remote(origin),
		}
	}

	pub fn is_local(&self) -> bool {
		matches!(self.source, EventSource::Local)
	}
}

/// Event as exchanged between contexts.
///
/// ```json
/// {
///   "origin": 3,
///   "event": { "kind": "SIGNED_OUT", "session": null, "source": { "type": "local" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
	pub origin: ContextId,
	pub event: SessionEvent,
}
