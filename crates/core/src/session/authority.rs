use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use gate_protocol::{ContextId, Credentials, Session, SessionEvent, SessionEventKind};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::backend::AuthBackend;
use super::store::SessionStore;
use crate::error::AuthError;

const EVENT_CAPACITY: usize = 64;

type RefreshFuture = Shared<BoxFuture<'static, Result<Session, AuthError>>>;

/// Coarse state of the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
	Unauthenticated,
	Authenticated,
	/// A refresh is in flight; the previous session is still current.
	Refreshing,
}

impl AuthPhase {
	pub fn as_str(self) -> &'static str {
		match self {
			AuthPhase::Unauthenticated => "unauthenticated",
			AuthPhase::Authenticated => "authenticated",
			AuthPhase::Refreshing => "refreshing",
		}
	}
}

/// Owner of the client's single current session.
///
/// Cloning is cheap and every clone observes the same session. At most one
/// refresh is in flight at a time; concurrent [`refresh`](Self::refresh)
/// callers share its result.
#[derive(Clone)]
pub struct SessionAuthority {
	inner: Arc<Inner>,
}

struct Inner {
	backend: Arc<dyn AuthBackend>,
	store: Arc<dyn SessionStore>,
	state: Mutex<AuthState>,
	events: broadcast::Sender<SessionEvent>,
}

/// The one refresh in flight, tagged with the epoch it started under.
struct RefreshSlot {
	seq: u64,
	epoch: u64,
	pending: RefreshFuture,
}

#[derive(Default)]
struct AuthState {
	session: Option<Session>,
	/// Cleared only by the refresh that owns it, once the backend call ends.
	refreshing: Option<RefreshSlot>,
	refresh_seq: u64,
	/// Bumped by every transition that replaces the session from outside a
	/// refresh. A refresh that started under an older epoch may not store
	/// its result.
	epoch: u64,
}

impl SessionAuthority {
	pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn SessionStore>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			inner: Arc::new(Inner {
				backend,
				store,
				state: Mutex::new(AuthState::default()),
				events,
			}),
		}
	}

	/// Loads the persisted session, if any, and makes it current.
	///
	/// Emits nothing. A session already held in memory is kept.
	pub fn restore(&self) -> Result<Option<Session>, AuthError> {
		let loaded = self.inner.store.load()?;
		let mut state = self.inner.state.lock();
		if state.session.is_some() {
			return Ok(state.session.clone());
		}
		if let Some(session) = &loaded {
			debug!(
				target = "gate.session",
				key = self.inner.store.key(),
				user = %session.identity.id,
				"session restored"
			);
			state.session = Some(session.clone());
			state.epoch += 1;
		}
		Ok(loaded)
	}

	pub fn current_session(&self) -> Option<Session> {
		self.inner.state.lock().session.clone()
	}

	pub fn phase(&self) -> AuthPhase {
		let state = self.inner.state.lock();
		match (&state.session, &state.refreshing) {
			(None, _) => AuthPhase::Unauthenticated,
			(Some(_), Some(slot)) if slot.epoch == state.epoch => AuthPhase::Refreshing,
			(Some(_), _) => AuthPhase::Authenticated,
		}
	}

	/// Stream of lifecycle events, in the order the authority applied them.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.inner.events.subscribe()
	}

	/// Exchanges the current session for a fresh one.
	///
	/// Joins the in-flight refresh when there is one. A refresh left over
	/// from a replaced session is waited out before a new one starts, so the
	/// backend never sees two at once. On backend failure the session is
	/// presumed invalid: it is dropped, the persisted copy is cleared and
	/// `SignedOut` is emitted.
	pub async fn refresh(&self) -> Result<Session, AuthError> {
		loop {
			let (pending, stale) = {
				let mut state = self.inner.state.lock();
				match &state.refreshing {
					Some(slot) => {
						let stale = slot.epoch != state.epoch;
						if !stale {
							debug!(target = "gate.session", "joining in-flight refresh");
						}
						(slot.pending.clone(), stale)
					}
					None => {
						let Some(session) = state.session.clone() else {
							return Err(AuthError::NoSession);
						};
						(self.inner.start_refresh(&mut state, session), false)
					}
				}
			};
			if !stale {
				return pending.await;
			}
			debug!(target = "gate.session", "waiting out superseded refresh");
			let _ = pending.await;
		}
	}

	pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
		let session = self.inner.backend.sign_in(credentials).await.map_err(|err| {
			warn!(target = "gate.session", email = %credentials.email, error = %err, "sign-in failed");
			AuthError::from(err)
		})?;
		{
			let mut state = self.inner.state.lock();
			state.session = Some(session.clone());
			state.epoch += 1;
		}
		info!(target = "gate.session", user = %session.identity.id, "signed in");
		self.inner.persist(&session);
		self.inner.emit(SessionEvent::local(SessionEventKind::SignedIn, Some(session.clone())));
		Ok(session)
	}

	/// Signs out locally and on the platform.
	///
	/// Local state and storage are cleared even when the platform call
	/// fails; that failure is reported afterwards.
	pub async fn sign_out(&self) -> Result<(), AuthError> {
		let Some(session) = self.inner.take_session() else {
			debug!(target = "gate.session", "sign-out without a session");
			self.inner.clear_store();
			return Ok(());
		};

		let remote = self.inner.backend.sign_out(&session).await;
		self.inner.clear_store();
		info!(target = "gate.session", user = %session.identity.id, "signed out");
		self.inner.emit(SessionEvent::local(SessionEventKind::SignedOut, None));

		remote.map_err(|err| {
			warn!(target = "gate.session", error = %err, "platform sign-out failed");
			AuthError::from(err)
		})
	}

	/// Drops the local session because another context signed out.
	///
	/// Does not call the platform. Returns `true` if a session was dropped.
	pub fn invalidate_remote(&self, origin: ContextId) -> bool {
		let Some(session) = self.inner.take_session() else {
			return false;
		};
		self.inner.clear_store();
		info!(
			target = "gate.session",
			user = %session.identity.id,
			origin = %origin,
			"session invalidated by another context"
		);
		self.inner.emit(SessionEvent::remote(SessionEventKind::SignedOut, None, origin));
		true
	}

	/// Makes a session produced by another context current.
	///
	/// Used for remote `SignedIn` and `TokenRefreshed` events. The session is
	/// not persisted again; the originating context already did.
	pub fn adopt_remote(&self, kind: SessionEventKind, session: Session, origin: ContextId) {
		{
			let mut state = self.inner.state.lock();
			if state.session.as_ref() == Some(&session) {
				return;
			}
			state.session = Some(session.clone());
			state.epoch += 1;
		}
		debug!(target = "gate.session", kind = %kind, origin = %origin, "adopted session from another context");
		self.inner.emit(SessionEvent::remote(kind, Some(session), origin));
	}
}

impl Inner {
	/// Installs and spawns a new refresh of `session`. Called with the state
	/// lock held and no refresh in flight.
	fn start_refresh(self: &Arc<Self>, state: &mut AuthState, session: Session) -> RefreshFuture {
		let inner = Arc::clone(self);
		let epoch = state.epoch;
		state.refresh_seq += 1;
		let seq = state.refresh_seq;
		let pending = async move {
			let result = inner.run_refresh(session, epoch).await;
			let mut state = inner.state.lock();
			if state.refreshing.as_ref().is_some_and(|slot| slot.seq == seq) {
				state.refreshing = None;
			}
			drop(state);
			result
		}
		.boxed()
		.shared();
		state.refreshing = Some(RefreshSlot {
			seq,
			epoch,
			pending: pending.clone(),
		});
		// Progresses even if every caller stops waiting.
		tokio::spawn(pending.clone());
		pending
	}

	async fn run_refresh(&self, session: Session, epoch: u64) -> Result<Session, AuthError> {
		debug!(target = "gate.session", user = %session.identity.id, "refreshing session");
		let result = self.backend.refresh(&session).await;

		let outcome = {
			let mut state = self.state.lock();
			if state.epoch != epoch {
				None
			} else {
				match &result {
					Ok(fresh) => state.session = Some(fresh.clone()),
					Err(_) => {
						state.session = None;
						state.epoch += 1;
					}
				}
				Some(())
			}
		};
		if outcome.is_none() {
			debug!(target = "gate.session", "refresh result discarded; session changed meanwhile");
			return Err(AuthError::Superseded);
		}

		match result {
			Ok(fresh) => {
				debug!(target = "gate.session", user = %fresh.identity.id, expires_at = fresh.expires_at, "session refreshed");
				self.persist(&fresh);
				self.emit(SessionEvent::local(SessionEventKind::TokenRefreshed, Some(fresh.clone())));
				Ok(fresh)
			}
			Err(err) => {
				warn!(target = "gate.session", error = %err, "refresh failed; signing out");
				self.clear_store();
				self.emit(SessionEvent::local(SessionEventKind::SignedOut, None));
				Err(AuthError::Backend(err))
			}
		}
	}

	fn take_session(&self) -> Option<Session> {
		let mut state = self.state.lock();
		state.epoch += 1;
		state.session.take()
	}

	fn persist(&self, session: &Session) {
		if let Err(err) = self.store.save(session) {
			warn!(target = "gate.session", key = self.store.key(), error = %err, "failed to persist session");
		}
	}

	fn clear_store(&self) {
		if let Err(err) = self.store.clear() {
			warn!(target = "gate.session", key = self.store.key(), error = %err, "failed to clear persisted session");
		}
	}

	fn emit(&self, event: SessionEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}
}
