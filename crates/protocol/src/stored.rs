//! Persisted session record.

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Current schema version of [`StoredSession`].
pub const STORED_SESSION_SCHEMA_VERSION: u32 = 1;

/// Session persisted under a fixed storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
	pub schema_version: u32,
	pub key: String,
	pub session: Session,
	/// Unix seconds at which the record was written.
	pub saved_at: u64,
}

impl StoredSession {
	pub fn new(key: impl Into<String>, session: Session, saved_at: u64) -> Self {
		Self {
			schema_version: STORED_SESSION_SCHEMA_VERSION,
			key: key.into(),
			session,
			saved_at,
		}
	}

	/// Returns `true` when the record was written with a supported schema
	/// under `key`.
	pub fn matches(&self, key: &str) -> bool {
		self.schema_version == STORED_SESSION_SCHEMA_VERSION && self.key == key
	}
}
