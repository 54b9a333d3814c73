//! Keeps the sessions of all contexts of one client in step.
//!
//! Locally originated authority events are published to the other contexts.
//! A sign-out in any context signs every context out: the receiving side
//! drops its session, discards queued gateway work and bumps the reload
//! generation so the application can rebuild its state.

use std::sync::Arc;

use gate_protocol::{Envelope, SessionEventKind};
use gate_runtime::{TaskHandle, spawn_named};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::gateway::Gateway;
use crate::session::SessionAuthority;

/// Running session synchronisation for one context.
pub struct SessionSync {
	forward: TaskHandle,
	receive: TaskHandle,
	reload: Arc<watch::Sender<u64>>,
}

impl SessionSync {
	pub fn spawn(authority: SessionAuthority, broadcaster: Broadcaster, gateway: Gateway) -> Self {
		let (reload, _) = watch::channel(0u64);
		let reload = Arc::new(reload);
		let context = broadcaster.id();

		let mut events = authority.subscribe();
		let outbound = broadcaster.clone();
		let forward = spawn_named(format!("session-forward-{context}"), async move {
			loop {
				match events.recv().await {
					// Events applied on behalf of another context stay here.
					Ok(event) if !event.is_local() => continue,
					Ok(event) => {
						outbound.publish(event);
					}
					Err(RecvError::Lagged(skipped)) => {
						warn!(target = "gate.sync", context = %context, skipped, "session events dropped before publishing");
					}
					Err(RecvError::Closed) => break,
				}
			}
		});

		let receive = broadcaster.on_receive({
			let reload = Arc::clone(&reload);
			move |envelope| apply_remote(&authority, &gateway, &reload, envelope)
		});

		debug!(target = "gate.sync", context = %context, "session sync started");
		Self { forward, receive, reload }
	}

	/// Generation counter bumped on every remote sign-out.
	pub fn reload_requests(&self) -> watch::Receiver<u64> {
		self.reload.subscribe()
	}

	pub async fn shutdown(self) {
		self.forward.shutdown().await;
		self.receive.shutdown().await;
	}
}

fn apply_remote(authority: &SessionAuthority, gateway: &Gateway, reload: &watch::Sender<u64>, envelope: Envelope) {
	let Envelope { origin, event } = envelope;
	match event.kind {
		SessionEventKind::SignedOut => {
			let invalidated = authority.invalidate_remote(origin);
			let discarded = gateway.reset();
			reload.send_modify(|generation| *generation += 1);
			info!(
				target = "gate.sync",
				origin = %origin,
				invalidated,
				discarded,
				generation = *reload.borrow(),
				"signed out by another context"
			);
		}
		SessionEventKind::SignedIn | SessionEventKind::TokenRefreshed => match event.session {
			Some(session) => authority.adopt_remote(event.kind, session, origin),
			None => debug!(target = "gate.sync", origin = %origin, kind = %event.kind, "remote event without a session"),
		},
	}
}
