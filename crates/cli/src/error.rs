use gate::{AttemptError, AuthError, ConfigError, GatewayError, HealthError, StoreError};
use thiserror::Error;

use crate::output::ErrorCode;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("backend URL is required (--url or GATE_URL)")]
	MissingUrl,

	#[error("API key is required (--api-key or GATE_API_KEY)")]
	MissingApiKey,

	#[error("invalid backend URL {url}: {source}")]
	InvalidUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	#[error("no state directory available; pass --state-dir")]
	NoStateDir,

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Gateway(#[from] GatewayError),

	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("health check failed: {0}")]
	Health(#[from] HealthError),

	#[error("failed to build HTTP client: {0}")]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Health(HealthError::Probe(err)) => Self::gateway_code(err),
			Self::Health(HealthError::Refresh(_)) => ErrorCode::AuthError,
			Self::MissingUrl | Self::MissingApiKey | Self::InvalidUrl { .. } | Self::NoStateDir => ErrorCode::InvalidInput,
			Self::Config(_) => ErrorCode::ConfigError,
			Self::Gateway(err) => Self::gateway_code(err),
			Self::Auth(AuthError::NoSession) => ErrorCode::NoSession,
			Self::Auth(AuthError::Store(_)) | Self::Store(_) => ErrorCode::IoError,
			Self::Auth(_) => ErrorCode::AuthError,
			Self::Http(_) | Self::Anyhow(_) => ErrorCode::InternalError,
		}
	}

	fn gateway_code(err: &GatewayError) -> ErrorCode {
		match err {
			GatewayError::Exhausted { last: AttemptError::Timeout(_), .. } => ErrorCode::Timeout,
			GatewayError::Exhausted { .. } => ErrorCode::RetriesExhausted,
			GatewayError::Rejected(_) => ErrorCode::Rejected,
			GatewayError::Cancelled | GatewayError::Abandoned => ErrorCode::Cancelled,
		}
	}

	/// Backend error fields worth surfacing in the envelope.
	pub fn details(&self) -> Option<serde_json::Value> {
		let backend = match self {
			Self::Gateway(err) | Self::Health(HealthError::Probe(err)) => err.backend(),
			Self::Auth(AuthError::Backend(err)) | Self::Health(HealthError::Refresh(AuthError::Backend(err))) => Some(err),
			_ => None,
		}?;
		Some(serde_json::json!({
			"message": backend.message,
			"code": backend.code,
			"status": backend.status,
		}))
	}
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use gate::BackendError;

	use super::*;

	#[test]
	fn gateway_errors_map_to_codes() {
		let timeout = CliError::from(GatewayError::Exhausted {
			attempts: 3,
			last: AttemptError::Timeout(Duration::from_secs(15)),
		});
		assert_eq!(timeout.code(), ErrorCode::Timeout);
		assert!(timeout.details().is_none());

		let backend = CliError::from(GatewayError::Exhausted {
			attempts: 1,
			last: BackendError::new("JWT expired").with_status(401).into(),
		});
		assert_eq!(backend.code(), ErrorCode::RetriesExhausted);
		assert_eq!(backend.details().unwrap()["status"], 401);
	}

	#[test]
	fn missing_inputs_are_invalid_input() {
		assert_eq!(CliError::MissingUrl.code(), ErrorCode::InvalidInput);
		assert_eq!(CliError::from(AuthError::NoSession).code(), ErrorCode::NoSession);
	}
}
