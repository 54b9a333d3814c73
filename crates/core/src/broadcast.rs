//! Session events shared between the execution contexts of one client.
//!
//! A [`BroadcastHub`] is the medium; each context joins it once and gets a
//! [`Broadcaster`] with its own [`ContextId`]. Envelopes a context publishes
//! reach every other context, never itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gate_protocol::{ContextId, Envelope, SessionEvent};
use gate_runtime::{TaskHandle, spawn_named};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace, warn};

pub const DEFAULT_CAPACITY: usize = 32;

/// Medium connecting the contexts of one client.
#[derive(Clone)]
pub struct BroadcastHub {
	tx: broadcast::Sender<Envelope>,
	next_id: Arc<AtomicU64>,
}

impl Default for BroadcastHub {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

impl BroadcastHub {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self {
			tx,
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Registers a new context.
	pub fn join(&self) -> Broadcaster {
		let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
		debug!(target = "gate.sync", context = %id, "context joined");
		Broadcaster { id, tx: self.tx.clone() }
	}
}

/// One context's end of the hub.
#[derive(Clone)]
pub struct Broadcaster {
	id: ContextId,
	tx: broadcast::Sender<Envelope>,
}

impl Broadcaster {
	pub fn id(&self) -> ContextId {
		self.id
	}

	/// Sends `event` to the other contexts. Returns the number of live
	/// subscriptions on the hub.
	pub fn publish(&self, event: SessionEvent) -> usize {
		let kind = event.kind;
		let envelope = Envelope { origin: self.id, event };
		match self.tx.send(envelope) {
			Ok(receivers) => {
				debug!(target = "gate.sync", context = %self.id, kind = %kind, "event published");
				receivers
			}
			Err(_) => {
				trace!(target = "gate.sync", context = %self.id, kind = %kind, "no listeners");
				0
			}
		}
	}

	/// Invokes `handler` for every envelope published by another context.
	///
	/// The subscription exists when this returns, so nothing published
	/// afterwards is missed.
	pub fn on_receive<F>(&self, mut handler: F) -> TaskHandle
	where
		F: FnMut(Envelope) + Send + 'static,
	{
		let mut rx = self.tx.subscribe();
		let own = self.id;
		spawn_named(format!("broadcast-{own}"), async move {
			loop {
				match rx.recv().await {
					Ok(envelope) if envelope.origin == own => continue,
					Ok(envelope) => {
						trace!(target = "gate.sync", context = %own, origin = %envelope.origin, kind = %envelope.event.kind, "event received");
						handler(envelope);
					}
					Err(RecvError::Lagged(skipped)) => {
						warn!(target = "gate.sync", context = %own, skipped, "receiver lagged; events dropped");
					}
					Err(RecvError::Closed) => break,
				}
			}
		})
	}
}
