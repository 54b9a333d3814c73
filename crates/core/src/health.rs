//! Connection health monitoring.
//!
//! A lightweight probe runs through the gateway on demand, periodically while
//! the client is in active use, and whenever the client returns to the
//! foreground.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use gate_protocol::Session;
use gate_runtime::{LivenessTracker, TaskHandle, spawn_named, spawn_periodic};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::classify::ErrorClass;
use crate::config::HealthConfig;
use crate::error::{AuthError, BackendError, HealthError};
use crate::gateway::{Gateway, RetryPolicy};

/// Cheap read against the backend used as a connectivity probe.
///
/// Receives the session current at the time of each attempt.
pub type ProbeFn = Arc<dyn Fn(Option<Session>) -> BoxFuture<'static, Result<(), BackendError>> + Send + Sync>;

/// Wraps an async closure as a [`ProbeFn`].
pub fn probe_fn<F, Fut>(probe: F) -> ProbeFn
where
	F: Fn(Option<Session>) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), BackendError>> + Send + 'static,
{
	Arc::new(move |session| probe(session).boxed())
}

/// Outcome of one health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
	pub ok: bool,
	/// Time from submission to settlement of the probe.
	pub latency: Duration,
	pub error: Option<HealthError>,
}

/// Periodic and on-demand health checks for one client.
#[derive(Clone)]
pub struct HealthMonitor {
	inner: Arc<Inner>,
}

struct Inner {
	gateway: Gateway,
	liveness: LivenessTracker,
	probe: ProbeFn,
	config: HealthConfig,
	periodic: Mutex<Option<TaskHandle>>,
	last: watch::Sender<Option<HealthReport>>,
}

impl HealthMonitor {
	pub fn new(gateway: Gateway, liveness: LivenessTracker, probe: ProbeFn, config: HealthConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				gateway,
				liveness,
				probe,
				config,
				periodic: Mutex::new(None),
				last: watch::channel(None).0,
			}),
		}
	}

	pub fn config(&self) -> &HealthConfig {
		&self.inner.config
	}

	/// Runs one probe now.
	///
	/// A credential failure triggers a session refresh when a session exists;
	/// the check then passes if the refresh did.
	pub async fn check_now(&self) -> HealthReport {
		Inner::check_now(&self.inner).await
	}

	/// Starts periodic checks every `interval`. Returns `false` if they were
	/// already running.
	///
	/// Ticks are skipped while the client is inactive or signed out.
	pub fn start_periodic(&self, interval: Duration) -> bool {
		Inner::start_periodic(&self.inner, interval)
	}

	pub fn is_running(&self) -> bool {
		self.inner.periodic.lock().as_ref().is_some_and(|task| !task.is_finished())
	}

	/// Stops periodic checks.
	pub fn stop(&self) {
		if let Some(mut task) = self.inner.periodic.lock().take() {
			task.stop();
			debug!(target = "gate.health", "periodic checks stopped");
		}
	}

	/// Initial check; periodic checks start only if it passes.
	pub async fn start(&self) -> HealthReport {
		let report = self.check_now().await;
		if report.ok {
			info!(target = "gate.health", latency_ms = report.latency.as_millis() as u64, "initial health check passed");
			self.start_periodic(self.inner.config.check_interval());
		} else {
			warn!(target = "gate.health", error = ?report.error, "initial health check failed; periodic checks not started");
		}
		report
	}

	/// Re-establishes the connection after the client returns to the
	/// foreground.
	///
	/// Refreshes the session if there is one, discards queued gateway work,
	/// checks immediately and resumes periodic checks if the check passed.
	pub async fn on_foreground(&self) -> HealthReport {
		let authority = self.inner.gateway.authority();
		if authority.current_session().is_some() {
			if let Err(err) = authority.refresh().await {
				warn!(target = "gate.health", error = %err, "refresh on foreground failed");
			}
		}

		let discarded = self.inner.gateway.reset();
		let report = self.check_now().await;
		if report.ok {
			info!(target = "gate.health", discarded, "connection re-established");
			if !self.is_running() {
				self.start_periodic(self.inner.config.check_interval());
			}
		} else {
			warn!(target = "gate.health", discarded, error = ?report.error, "connection not re-established");
		}
		report
	}

	/// Runs [`on_foreground`](Self::on_foreground) on every transition of the
	/// tracker into the foreground.
	pub fn watch_foreground(&self) -> TaskHandle {
		let mut visibility = self.inner.liveness.visibility();
		let weak = Arc::downgrade(&self.inner);
		spawn_named("health-foreground", async move {
			while visibility.changed().await.is_ok() {
				let foreground = *visibility.borrow_and_update();
				if !foreground {
					continue;
				}
				let Some(inner) = weak.upgrade() else {
					break;
				};
				HealthMonitor { inner }.on_foreground().await;
			}
		})
	}

	pub fn last_report(&self) -> Option<HealthReport> {
		self.inner.last.borrow().clone()
	}

	/// Every report as it is produced.
	pub fn reports(&self) -> watch::Receiver<Option<HealthReport>> {
		self.inner.last.subscribe()
	}
}

impl Inner {
	async fn check_now(&self) -> HealthReport {
		// The single refresh below is the check's own recovery.
		let policy = RetryPolicy::new(self.config.probe_retries, self.gateway.config().base_delay()).without_recovery();
		let probe = Arc::clone(&self.probe);
		let authority = self.gateway.authority().clone();
		let started = Instant::now();
		let outcome = self
			.gateway
			.submit_with(policy, move || probe(authority.current_session()))
			.await;
		let latency = started.elapsed();

		let report = match outcome {
			Ok(()) => HealthReport { ok: true, latency, error: None },
			Err(err) if self.gateway.classify(&err) == Some(ErrorClass::CredentialExpired) => {
				let authority = self.gateway.authority();
				if authority.current_session().is_none() {
					HealthReport {
						ok: false,
						latency,
						error: Some(HealthError::Probe(err)),
					}
				} else {
					debug!(target = "gate.health", "probe rejected the credential; refreshing");
					match authority.refresh().await {
						Ok(_) => HealthReport { ok: true, latency, error: None },
						Err(AuthError::Superseded) if authority.current_session().is_some() => {
							HealthReport { ok: true, latency, error: None }
						}
						Err(refresh_err) => HealthReport {
							ok: false,
							latency,
							error: Some(HealthError::Refresh(refresh_err)),
						},
					}
				}
			}
			Err(err) => HealthReport {
				ok: false,
				latency,
				error: Some(HealthError::Probe(err)),
			},
		};

		match &report.error {
			None => debug!(target = "gate.health", latency_ms = latency.as_millis() as u64, "health check passed"),
			Some(err) => warn!(target = "gate.health", latency_ms = latency.as_millis() as u64, error = %err, "health check failed"),
		}
		self.last.send_replace(Some(report.clone()));
		report
	}

	fn start_periodic(self: &Arc<Self>, interval: Duration) -> bool {
		let mut periodic = self.periodic.lock();
		if periodic.as_ref().is_some_and(|task| !task.is_finished()) {
			trace!(target = "gate.health", "periodic checks already running");
			return false;
		}

		let weak: Weak<Self> = Arc::downgrade(self);
		*periodic = Some(spawn_periodic("health-periodic", interval, move || {
			let weak = weak.clone();
			async move {
				let Some(inner) = weak.upgrade() else {
					return;
				};
				if !inner.liveness.is_active() {
					trace!(target = "gate.health", "client inactive; skipping check");
					return;
				}
				if inner.gateway.authority().current_session().is_none() {
					trace!(target = "gate.health", "no session; skipping check");
					return;
				}
				let report = Inner::check_now(&inner).await;
				if !report.ok {
					warn!(target = "gate.health", error = ?report.error, "periodic health check failed");
				}
			}
		}));
		debug!(target = "gate.health", interval_ms = interval.as_millis() as u64, "periodic checks started");
		true
	}
}
