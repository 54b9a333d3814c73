use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gate_protocol::{Session, StoredSession};
use parking_lot::Mutex;

use crate::error::StoreError;

/// Storage for the persisted session under a fixed key.
pub trait SessionStore: Send + Sync {
	fn key(&self) -> &str;

	/// Loads the persisted session, if any.
	fn load(&self) -> Result<Option<Session>, StoreError>;

	fn save(&self, session: &Session) -> Result<(), StoreError>;

	/// Removes the persisted session. Returns `true` if one existed.
	fn clear(&self) -> Result<bool, StoreError>;
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
	key: String,
	slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			slot: Mutex::new(None),
		}
	}

	/// Creates a store that already holds `session`.
	pub fn with_session(key: impl Into<String>, session: Session) -> Self {
		Self {
			key: key.into(),
			slot: Mutex::new(Some(session)),
		}
	}
}

impl SessionStore for MemorySessionStore {
	fn key(&self) -> &str {
		&self.key
	}

	fn load(&self) -> Result<Option<Session>, StoreError> {
		Ok(self.slot.lock().clone())
	}

	fn save(&self, session: &Session) -> Result<(), StoreError> {
		*self.slot.lock() = Some(session.clone());
		Ok(())
	}

	fn clear(&self) -> Result<bool, StoreError> {
		Ok(self.slot.lock().take().is_some())
	}
}

/// JSON file holding one [`StoredSession`] record.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
	key: String,
	path: PathBuf,
}

impl FileSessionStore {
	pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
		Self {
			key: key.into(),
			path: path.into(),
		}
	}

	/// Store at `<dir>/<key>.json`.
	pub fn in_dir(dir: &Path, key: impl Into<String>) -> Self {
		let key = key.into();
		let path = dir.join(format!("{key}.json"));
		Self { key, path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, err: std::io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			message: err.to_string(),
		}
	}
}

impl SessionStore for FileSessionStore {
	fn key(&self) -> &str {
		&self.key
	}

	fn load(&self) -> Result<Option<Session>, StoreError> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(self.io_error(err)),
		};
		let record: StoredSession = serde_json::from_str(&content).map_err(|e| StoreError::Malformed(e.to_string()))?;
		if !record.matches(&self.key) {
			tracing::debug!(
				target = "gate.session",
				path = %self.path.display(),
				key = %record.key,
				schema = record.schema_version,
				"ignoring session record for another key or schema"
			);
			return Ok(None);
		}
		Ok(Some(record.session))
	}

	fn save(&self, session: &Session) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
		}
		let record = StoredSession::new(self.key.clone(), session.clone(), now_ts());
		let json = serde_json::to_string_pretty(&record).map_err(|e| StoreError::Malformed(e.to_string()))?;

		// Readers never observe a partially written record.
		let tmp = self.path.with_extension("json.tmp");
		fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
		fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
	}

	fn clear(&self) -> Result<bool, StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(self.io_error(err)),
		}
	}
}

pub(crate) fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use gate_protocol::Identity;
	use tempfile::TempDir;

	use super::*;

	fn session() -> Session {
		Session {
			access_token: "access".into(),
			refresh_token: "refresh".into(),
			expires_at: 4_000_000_000,
			identity: Identity {
				id: "user-1".into(),
				email: Some("user@example.com".into()),
			},
		}
	}

	#[test]
	fn file_store_round_trips_and_clears() {
		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::in_dir(&tmp.path().join("nested"), "lists-auth");
		assert_eq!(store.load().unwrap(), None);

		store.save(&session()).unwrap();
		assert!(store.path().ends_with("nested/lists-auth.json"));
		assert_eq!(store.load().unwrap(), Some(session()));

		assert!(store.clear().unwrap());
		assert!(!store.clear().unwrap());
		assert_eq!(store.load().unwrap(), None);
	}

	#[test]
	fn file_store_ignores_other_keys() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("auth.json");
		FileSessionStore::new("other-app", &path).save(&session()).unwrap();

		let store = FileSessionStore::new("lists-auth", &path);
		assert_eq!(store.load().unwrap(), None);
	}

	#[test]
	fn file_store_reports_malformed_records() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("auth.json");
		fs::write(&path, "{ not json").unwrap();

		let err = FileSessionStore::new("k", &path).load().unwrap_err();
		assert!(matches!(err, StoreError::Malformed(_)));
	}

	#[test]
	fn memory_store_clear_reports_presence() {
		let store = MemorySessionStore::with_session("k", session());
		assert_eq!(store.key(), "k");
		assert!(store.clear().unwrap());
		assert!(!store.clear().unwrap());
	}
}
