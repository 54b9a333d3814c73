//! Best-effort access-token claim decoding.
//!
//! Signatures are not verified; the backend is the authority on validity.
//! Claims are only read to fill in expiry and identity when a token response
//! omits them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::session::Identity;

/// Subset of JWT claims used by the session authority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
	#[serde(default)]
	pub sub: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
	#[serde(default)]
	pub exp: Option<u64>,
}

impl TokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn decode(token: &str) -> Option<Self> {
		let mut parts = token.split('.');
		let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
		if parts.next().is_some() {
			return None;
		}
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
		serde_json::from_slice(&bytes).ok()
	}

	pub fn into_identity(self) -> Option<Identity> {
		Some(Identity {
			id: self.sub?,
			email: self.email,
		})
	}
}
