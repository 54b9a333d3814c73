//! Client liveness tracking.
//!
//! Records whether the client is in the foreground and when the user last
//! interacted with it. Background work (health checks, periodic refresh)
//! consults [`LivenessTracker::is_active`] before running; foreground-triggered
//! work never does.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

/// Default inactivity window after which background work pauses.
pub const DEFAULT_MAX_INACTIVE: Duration = Duration::from_secs(5 * 60);

/// User-interaction signals that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
	VisibilityForeground,
	PointerMove,
	KeyPress,
	Click,
	Scroll,
}

/// Snapshot of the tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessState {
	pub is_foreground: bool,
	pub last_active_at: Instant,
}

/// Shared liveness tracker. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
	inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
	max_inactive: Duration,
	state: Mutex<LivenessState>,
	visibility: watch::Sender<bool>,
}

impl Default for LivenessTracker {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_INACTIVE)
	}
}

impl LivenessTracker {
	/// Creates a tracker that starts in the foreground and active now.
	pub fn new(max_inactive: Duration) -> Self {
		let (visibility, _) = watch::channel(true);
		Self {
			inner: Arc::new(Inner {
				max_inactive,
				state: Mutex::new(LivenessState {
					is_foreground: true,
					last_active_at: Instant::now(),
				}),
				visibility,
			}),
		}
	}

	pub fn max_inactive(&self) -> Duration {
		self.inner.max_inactive
	}

	pub fn state(&self) -> LivenessState {
		*self.inner.state.lock()
	}

	/// Returns `true` when the client is foregrounded and was used recently.
	pub fn is_active(&self) -> bool {
		let state = self.state();
		state.is_foreground && state.last_active_at.elapsed() < self.inner.max_inactive
	}

	/// Records a user-interaction signal.
	pub fn record(&self, signal: ActivitySignal) {
		if signal == ActivitySignal::VisibilityForeground {
			self.set_foreground(true);
			return;
		}
		self.touch();
	}

	/// Marks activity without changing visibility.
	pub fn touch(&self) {
		self.inner.state.lock().last_active_at = Instant::now();
	}

	/// Applies a visibility change. Becoming visible also counts as activity.
	pub fn set_foreground(&self, foreground: bool) {
		{
			let mut state = self.inner.state.lock();
			state.is_foreground = foreground;
			if foreground {
				state.last_active_at = Instant::now();
			}
		}
		let changed = self.inner.visibility.send_if_modified(|current| {
			if *current == foreground {
				return false;
			}
			*current = foreground;
			true
		});
		if changed {
			tracing::debug!(target = "gate.runtime", foreground, "visibility changed");
		}
	}

	/// Subscribes to visibility transitions.
	pub fn visibility(&self) -> watch::Receiver<bool> {
		self.inner.visibility.subscribe()
	}
}
