//! Error types for the gateway, session authority and configuration.
//!
//! Errors that travel through shared futures (refresh results, health
//! reports) are `Clone`, so they carry messages rather than boxed sources.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a backend call: the `error` half of a
/// `{ data, error }` result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
	pub message: String,
	/// Backend-specific error code (e.g. `PGRST301`).
	pub code: Option<String>,
	/// Transport status, when the call went over HTTP.
	pub status: Option<u16>,
}

impl BackendError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			code: None,
			status: None,
		}
	}

	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());
		self
	}

	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);
		self
	}
}

/// Why a single execution attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
	#[error("attempt timed out after {}ms", .0.as_millis())]
	Timeout(Duration),

	#[error(transparent)]
	Backend(#[from] BackendError),

	#[error("operation panicked: {0}")]
	Panicked(String),
}

impl AttemptError {
	pub fn backend(&self) -> Option<&BackendError> {
		match self {
			Self::Backend(err) => Some(err),
			_ => None,
		}
	}
}

/// Terminal outcome of a submitted operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
	#[error("gave up after {attempts} attempt(s): {last}")]
	Exhausted {
		attempts: u32,
		#[source]
		last: AttemptError,
	},

	#[error("operation rejected: {0}")]
	Rejected(#[source] AttemptError),

	#[error("operation discarded by queue reset")]
	Cancelled,

	#[error("operation abandoned before it settled")]
	Abandoned,
}

impl GatewayError {
	/// Last attempt error observed for the operation, if it ever ran.
	pub fn last_attempt(&self) -> Option<&AttemptError> {
		match self {
			Self::Exhausted { last, .. } => Some(last),
			Self::Rejected(err) => Some(err),
			Self::Cancelled | Self::Abandoned => None,
		}
	}

	pub fn backend(&self) -> Option<&BackendError> {
		self.last_attempt().and_then(AttemptError::backend)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self.last_attempt(), Some(AttemptError::Timeout(_)))
	}
}

/// Persistence failures of a session store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
	#[error("session store io error at {path}: {message}")]
	Io { path: PathBuf, message: String },

	#[error("malformed session record: {0}")]
	Malformed(String),
}

/// Session authority failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
	#[error("no active session")]
	NoSession,

	#[error("session changed while the refresh was in flight")]
	Superseded,

	#[error("auth backend error: {0}")]
	Backend(#[from] BackendError),

	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Why a health check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
	#[error("probe failed: {0}")]
	Probe(#[source] GatewayError),

	#[error("session refresh after probe failed: {0}")]
	Refresh(#[source] AuthError),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid config: {0}")]
	Invalid(String),

	#[error("missing required component: {0}")]
	Missing(&'static str),
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
