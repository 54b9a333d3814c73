//! Authenticated session and credential types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::claims::TokenClaims;

/// Identity the session was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
	/// Backend user id (the `sub` claim).
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

/// Opaque authentication credential with an expiry.
///
/// Tokens are never printed by the `Debug` impl.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub access_token: String,
	pub refresh_token: String,
	/// Expiry as unix seconds.
	pub expires_at: u64,
	pub identity: Identity,
}

impl Session {
	/// Builds a session, reading expiry and identity from the access token
	/// claims when the backend did not supply them.
	pub fn from_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>, expires_at: Option<u64>, identity: Option<Identity>) -> Option<Self> {
		let access_token = access_token.into();
		let claims = TokenClaims::decode(&access_token);
		let expires_at = expires_at.or_else(|| claims.as_ref().and_then(|c| c.exp))?;
		let identity = identity.or_else(|| claims.and_then(TokenClaims::into_identity))?;
		Some(Self {
			access_token,
			refresh_token: refresh_token.into(),
			expires_at,
			identity,
		})
	}

	/// Returns `true` when the token is expired at `now` (unix seconds).
	pub fn is_expired_at(&self, now: u64) -> bool {
		now >= self.expires_at
	}

	/// Returns `true` when the token expires within `margin_secs` of `now`.
	pub fn expires_within(&self, now: u64, margin_secs: u64) -> bool {
		now.saturating_add(margin_secs) >= self.expires_at
	}

	/// Value for an `Authorization` header.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token)
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("identity", &self.identity)
			.finish()
	}
}

/// Password credentials used to sign in.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
	pub email: String,
	pub password: String,
}

impl Credentials {
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			password: password.into(),
		}
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials").field("email", &self.email).field("password", &"<redacted>").finish()
	}
}
