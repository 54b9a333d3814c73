//! FIFO admission queue with a concurrency budget and post-settlement pacing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
	pub queued: usize,
	pub active: usize,
	pub limit: usize,
}

/// A queued operation waiting for its turn.
struct Ticket {
	id: u64,
	start: oneshot::Sender<Permit>,
}

#[derive(Default)]
struct QueueState {
	queue: VecDeque<Ticket>,
	active: usize,
	resume_at: Option<Instant>,
	next_id: u64,
}

/// Admission control shared by every submission of one gateway.
pub(crate) struct Dispatcher {
	limit: usize,
	interval: Duration,
	state: Mutex<QueueState>,
}

/// Right to execute, held for the whole retry loop of one operation.
///
/// Dropping it releases the slot exactly once, whichever way the operation
/// ended.
pub(crate) struct Permit {
	dispatcher: Arc<Dispatcher>,
	id: u64,
	paced: bool,
}

impl Permit {
	pub(crate) fn id(&self) -> u64 {
		self.id
	}
}

impl Drop for Permit {
	fn drop(&mut self) {
		self.dispatcher.release(self.paced);
	}
}

impl Dispatcher {
	pub(crate) fn new(limit: usize, interval: Duration) -> Arc<Self> {
		Arc::new(Self {
			limit: limit.max(1),
			interval,
			state: Mutex::new(QueueState::default()),
		})
	}

	pub(crate) fn snapshot(&self) -> QueueSnapshot {
		let state = self.state.lock();
		QueueSnapshot {
			queued: state.queue.len(),
			active: state.active,
			limit: self.limit,
		}
	}

	/// Appends a ticket and returns the receiver its permit arrives on.
	///
	/// The receiver errors if the ticket is discarded by [`Self::reset`].
	pub(crate) fn enqueue(self: &Arc<Self>) -> (u64, oneshot::Receiver<Permit>) {
		let (start, rx) = oneshot::channel();
		let id = {
			let mut state = self.state.lock();
			state.next_id += 1;
			let id = state.next_id;
			state.queue.push_back(Ticket { id, start });
			id
		};
		self.pump();
		(id, rx)
	}

	/// Starts as many queued tickets as the budget allows, unless paced.
	pub(crate) fn pump(self: &Arc<Self>) {
		let ready: Vec<Ticket> = {
			let mut state = self.state.lock();
			if let Some(resume_at) = state.resume_at {
				if Instant::now() < resume_at {
					return;
				}
				state.resume_at = None;
			}
			let mut ready = Vec::new();
			while state.active < self.limit {
				let Some(ticket) = state.queue.pop_front() else {
					break;
				};
				state.active += 1;
				ready.push(ticket);
			}
			ready
		};

		// Permits are handed out after unlocking: a refused permit releases
		// its slot on drop, which locks again.
		for ticket in ready {
			let permit = Permit {
				dispatcher: Arc::clone(self),
				id: ticket.id,
				paced: true,
			};
			if let Err(mut permit) = ticket.start.send(permit) {
				tracing::trace!(target = "gate.gateway", id = ticket.id, "submitter gone; releasing slot");
				permit.paced = false;
				drop(permit);
			}
		}
	}

	fn release(self: &Arc<Self>, paced: bool) {
		let pace = paced && !self.interval.is_zero();
		{
			let mut state = self.state.lock();
			debug_assert!(state.active > 0, "released more permits than were issued");
			state.active = state.active.saturating_sub(1);
			if pace {
				state.resume_at = Some(Instant::now() + self.interval);
			}
		}

		if !pace {
			self.pump();
			return;
		}

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let dispatcher = Arc::clone(self);
				let interval = self.interval;
				handle.spawn(async move {
					tokio::time::sleep(interval).await;
					dispatcher.pump();
				});
			}
			Err(_) => {
				self.state.lock().resume_at = None;
				self.pump();
			}
		}
	}

	/// Discards every ticket that has not started. Returns how many.
	pub(crate) fn reset(&self) -> usize {
		let discarded: Vec<Ticket> = self.state.lock().queue.drain(..).collect();
		let count = discarded.len();
		// Dropping the senders settles the waiting submitters as cancelled.
		drop(discarded);
		count
	}
}
