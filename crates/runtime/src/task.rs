//! Named, stoppable background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a spawned background task.
///
/// Dropping the handle aborts the task, so loops never outlive the component
/// that started them.
#[derive(Debug)]
pub struct TaskHandle {
	name: String,
	handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns `true` once the task has run to completion or was aborted.
	pub fn is_finished(&self) -> bool {
		self.handle.as_ref().is_none_or(JoinHandle::is_finished)
	}

	/// Requests the task to stop without waiting for it.
	pub fn stop(&mut self) {
		if let Some(handle) = self.handle.take() {
			tracing::trace!(target = "gate.runtime", task = %self.name, "task.stop");
			handle.abort();
		}
	}

	/// Stops the task and waits until it has unwound.
	pub async fn shutdown(mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
			let _ = handle.await;
			tracing::trace!(target = "gate.runtime", task = %self.name, "task.shutdown");
		}
	}
}

impl Drop for TaskHandle {
	fn drop(&mut self) {
		self.stop();
	}
}

/// Spawns `fut` on the current runtime under `name`.
pub fn spawn_named<F>(name: impl Into<String>, fut: F) -> TaskHandle
where
	F: Future<Output = ()> + Send + 'static,
{
	let name = name.into();
	tracing::trace!(target = "gate.runtime", task = %name, "task.spawn");
	TaskHandle {
		name,
		handle: Some(tokio::spawn(fut)),
	}
}

/// Spawns a loop calling `tick` every `period`, first after one full period.
///
/// A tick that overruns delays the next one instead of bursting to catch up.
pub fn spawn_periodic<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> TaskHandle
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	let name = name.into();
	let task = name.clone();
	spawn_named(name, async move {
		let mut interval = tokio::time::interval_at(Instant::now() + period, period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			interval.tick().await;
			tracing::trace!(target = "gate.runtime", task = %task, "task.tick");
			tick().await;
		}
	})
}
