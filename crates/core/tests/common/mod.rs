#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gate::protocol::{Credentials, Identity, Session};
use gate::{AuthBackend, BackendError, GatewayConfig, MemorySessionStore, SessionAuthority};

/// Auth backend that counts calls and can be told to reject refreshes.
#[derive(Default)]
pub struct FakeBackend {
	pub sign_ins: AtomicUsize,
	pub refreshes: AtomicUsize,
	pub sign_outs: AtomicUsize,
	fail_refresh: AtomicBool,
}

impl FakeBackend {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn fail_refresh(&self, fail: bool) {
		self.fail_refresh.store(fail, Ordering::SeqCst);
	}

	pub fn refresh_count(&self) -> usize {
		self.refreshes.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl AuthBackend for FakeBackend {
	async fn sign_in(&self, credentials: &Credentials) -> Result<Session, BackendError> {
		self.sign_ins.fetch_add(1, Ordering::SeqCst);
		Ok(session(&format!("signed-in-{}", credentials.email)))
	}

	async fn refresh(&self, _session: &Session) -> Result<Session, BackendError> {
		let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
		tokio::time::sleep(Duration::from_millis(20)).await;
		if self.fail_refresh.load(Ordering::SeqCst) {
			return Err(BackendError::new("Invalid Refresh Token: Already Used").with_status(400));
		}
		Ok(session(&format!("refreshed-{n}")))
	}

	async fn sign_out(&self, _session: &Session) -> Result<(), BackendError> {
		self.sign_outs.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

pub fn session(token: &str) -> Session {
	Session {
		access_token: token.to_string(),
		refresh_token: format!("{token}-refresh"),
		expires_at: 4_000_000_000,
		identity: Identity {
			id: "user-1".into(),
			email: Some("user@example.com".into()),
		},
	}
}

pub fn signed_in(backend: &Arc<FakeBackend>) -> SessionAuthority {
	let store = Arc::new(MemorySessionStore::with_session("test-auth", session("initial")));
	let authority = SessionAuthority::new(backend.clone(), store);
	authority.restore().expect("memory store should load");
	authority
}

pub fn signed_out(backend: &Arc<FakeBackend>) -> SessionAuthority {
	SessionAuthority::new(backend.clone(), Arc::new(MemorySessionStore::new("test-auth")))
}

/// The error the platform returns for an expired access token.
pub fn jwt_expired() -> BackendError {
	BackendError::new("JWT expired").with_code("PGRST301").with_status(401)
}

/// Defaults with pacing turned off, so tests control timing explicitly.
pub fn unpaced(max_concurrent: usize, max_retries: u32) -> GatewayConfig {
	GatewayConfig {
		max_concurrent,
		max_retries,
		dispatch_interval_ms: 0,
		..GatewayConfig::default()
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}
