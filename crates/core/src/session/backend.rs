use async_trait::async_trait;
use gate_protocol::{Credentials, Session};

use crate::error::BackendError;

/// Auth operations of the hosted platform.
#[async_trait]
pub trait AuthBackend: Send + Sync {
	/// Exchanges credentials for a new session.
	async fn sign_in(&self, credentials: &Credentials) -> Result<Session, BackendError>;

	/// Exchanges the session's refresh token for a new session.
	async fn refresh(&self, session: &Session) -> Result<Session, BackendError>;

	/// Revokes the session on the platform.
	async fn sign_out(&self, session: &Session) -> Result<(), BackendError>;
}
