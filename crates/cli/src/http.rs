//! HTTP client for a PostgREST/GoTrue-style hosted backend.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gate::protocol::{Credentials, Identity, Session};
use gate::{AuthBackend, BackendError};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{CliError, Result};

pub const CLIENT_INFO: &str = concat!("gatectl/", env!("CARGO_PKG_VERSION"));

/// Backend reached over HTTP with an API key.
#[derive(Debug, Clone)]
pub struct HttpBackend {
	client: Client,
	base: Url,
	api_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	refresh_token: String,
	#[serde(default)]
	expires_in: Option<u64>,
	#[serde(default)]
	expires_at: Option<u64>,
	#[serde(default)]
	user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
	id: String,
	#[serde(default)]
	email: Option<String>,
}

impl HttpBackend {
	pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self> {
		let mut base = Url::parse(url).map_err(|source| CliError::InvalidUrl {
			url: url.to_string(),
			source,
		})?;
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}
		let client = Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
		Ok(Self {
			client,
			base,
			api_key: api_key.into(),
		})
	}

	pub fn base_url(&self) -> &Url {
		&self.base
	}

	/// Reads up to `limit` rows of `table`.
	pub async fn select(&self, session: Option<&Session>, table: &str, columns: &str, limit: u32) -> std::result::Result<Value, BackendError> {
		let url = self.endpoint(&format!("rest/v1/{table}"))?;
		let request = self
			.client
			.get(url)
			.query(&[("select", columns.to_string()), ("limit", limit.to_string())]);
		let response = self.send(self.authorize(request, session)).await?;
		response
			.json()
			.await
			.map_err(|e| BackendError::new(format!("malformed response: {e}")))
	}

	/// Cheapest authenticated read: one id from `table`.
	pub async fn probe(&self, session: Option<&Session>, table: &str) -> std::result::Result<(), BackendError> {
		self.select(session, table, "id", 1).await.map(|_| ())
	}

	fn endpoint(&self, path: &str) -> std::result::Result<Url, BackendError> {
		self.base
			.join(path)
			.map_err(|e| BackendError::new(format!("invalid endpoint {path}: {e}")))
	}

	fn authorize(&self, request: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
		let bearer = match session {
			Some(session) => session.bearer(),
			None => format!("Bearer {}", self.api_key),
		};
		request
			.header("apikey", &self.api_key)
			.header("x-client-info", CLIENT_INFO)
			.header(reqwest::header::AUTHORIZATION, bearer)
	}

	async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, BackendError> {
		let response = request
			.send()
			.await
			.map_err(|e| BackendError::new(format!("request failed: {e}")))?;
		let status = response.status();
		debug!(target = "gate.http", url = %response.url(), status = status.as_u16(), "response");
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(backend_error(status.as_u16(), &body))
	}

	async fn token(&self, grant_type: &str, body: Value) -> std::result::Result<Session, BackendError> {
		let mut url = self.endpoint("auth/v1/token")?;
		url.query_pairs_mut().append_pair("grant_type", grant_type);
		let request = self.authorize(self.client.post(url), None).json(&body);
		let response = self.send(request).await?;
		let token: TokenResponse = response
			.json()
			.await
			.map_err(|e| BackendError::new(format!("malformed token response: {e}")))?;
		session_from_token(token, unix_now())
	}
}

#[async_trait]
impl AuthBackend for HttpBackend {
	async fn sign_in(&self, credentials: &Credentials) -> std::result::Result<Session, BackendError> {
		self.token(
			"password",
			serde_json::json!({ "email": credentials.email, "password": credentials.password }),
		)
		.await
	}

	async fn refresh(&self, session: &Session) -> std::result::Result<Session, BackendError> {
		self.token("refresh_token", serde_json::json!({ "refresh_token": session.refresh_token }))
			.await
	}

	async fn sign_out(&self, session: &Session) -> std::result::Result<(), BackendError> {
		let url = self.endpoint("auth/v1/logout")?;
		self.send(self.authorize(self.client.post(url), Some(session))).await.map(|_| ())
	}
}

fn session_from_token(token: TokenResponse, now: u64) -> std::result::Result<Session, BackendError> {
	let expires_at = token.expires_at.or_else(|| token.expires_in.map(|secs| now.saturating_add(secs)));
	let identity = token.user.map(|user| Identity {
		id: user.id,
		email: user.email,
	});
	Session::from_tokens(token.access_token, token.refresh_token, expires_at, identity)
		.ok_or_else(|| BackendError::new("token response lacks expiry or user"))
}

/// Maps an error response body to a [`BackendError`].
///
/// Understands both REST (`message`, `code`) and auth (`error_description`,
/// `msg`, `error_code`) error shapes.
pub fn backend_error(status: u16, body: &str) -> BackendError {
	let parsed: Option<Value> = serde_json::from_str(body).ok();
	let field = |name: &str| -> Option<String> {
		match parsed.as_ref()?.get(name)? {
			Value::String(s) => Some(s.clone()),
			Value::Number(n) => Some(n.to_string()),
			_ => None,
		}
	};

	let message = ["message", "msg", "error_description", "error"]
		.into_iter()
		.find_map(|name| field(name))
		.or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
		.unwrap_or_else(|| format!("HTTP {status}"));
	let mut err = BackendError::new(message).with_status(status);
	if let Some(code) = field("error_code").or_else(|| field("code")) {
		err = err.with_code(code);
	}
	err
}

pub(crate) fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rest_errors_keep_message_and_code() {
		let err = backend_error(401, r#"{"code":"PGRST301","details":null,"hint":null,"message":"JWT expired"}"#);
		assert_eq!(err.message, "JWT expired");
		assert_eq!(err.code.as_deref(), Some("PGRST301"));
		assert_eq!(err.status, Some(401));
	}

	#[test]
	fn auth_errors_prefer_error_code() {
		let err = backend_error(400, r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#);
		assert_eq!(err.message, "Invalid login credentials");
		assert_eq!(err.code.as_deref(), Some("invalid_credentials"));

		let legacy = backend_error(400, r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#);
		assert_eq!(legacy.message, "Invalid Refresh Token");
	}

	#[test]
	fn non_json_bodies_fall_back_to_text_or_status() {
		assert_eq!(backend_error(502, "Bad Gateway\n").message, "Bad Gateway");
		assert_eq!(backend_error(503, "").message, "HTTP 503");
	}

	#[test]
	fn token_response_uses_expires_in_when_needed() {
		let token: TokenResponse = serde_json::from_str(
			r#"{"access_token":"a","refresh_token":"r","expires_in":3600,"user":{"id":"u-1","email":"e@x.io"}}"#,
		)
		.unwrap();
		let session = session_from_token(token, 1_000).unwrap();
		assert_eq!(session.expires_at, 4_600);
		assert_eq!(session.identity.id, "u-1");
	}

	#[test]
	fn huge_expires_in_saturates() {
		let token: TokenResponse =
			serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","expires_in":18446744073709551615,"user":{"id":"u-1"}}"#).unwrap();
		let session = session_from_token(token, 1_000).unwrap();
		assert_eq!(session.expires_at, u64::MAX);
	}

	#[test]
	fn base_url_gains_trailing_slash() {
		let backend = HttpBackend::new("https://example.supabase.co/base", "key").unwrap();
		assert_eq!(backend.endpoint("rest/v1/lists").unwrap().as_str(), "https://example.supabase.co/base/rest/v1/lists");
	}
}
