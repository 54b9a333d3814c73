//! One-stop assembly of the gateway and its collaborators.

use std::future::Future;
use std::sync::Arc;

use gate_protocol::ContextId;
use gate_runtime::{LivenessTracker, TaskHandle};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastHub, Broadcaster};
use crate::classify::Classifier;
use crate::config::ClientConfig;
use crate::error::{BackendError, ConfigError};
use crate::gateway::{Gateway, OperationHandle};
use crate::health::{HealthMonitor, HealthReport, ProbeFn};
use crate::session::{AuthBackend, MemorySessionStore, SessionAuthority, SessionStore};
use crate::sync::SessionSync;

/// Builder for [`GatewayClient`].
pub struct GatewayClientBuilder {
	config: ClientConfig,
	backend: Option<Arc<dyn AuthBackend>>,
	store: Option<Arc<dyn SessionStore>>,
	probe: Option<ProbeFn>,
	classifier: Classifier,
	hub: Option<BroadcastHub>,
}

impl GatewayClientBuilder {
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;
		self
	}

	pub fn backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
		self.backend = Some(backend);
		self
	}

	/// Session persistence. Defaults to an in-memory store under the
	/// configured storage key.
	pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn probe(mut self, probe: ProbeFn) -> Self {
		self.probe = Some(probe);
		self
	}

	pub fn classifier(mut self, classifier: Classifier) -> Self {
		self.classifier = classifier;
		self
	}

	/// Joins `hub` so sessions stay in step with the hub's other contexts.
	pub fn broadcast(mut self, hub: &BroadcastHub) -> Self {
		self.hub = Some(hub.clone());
		self
	}

	pub fn build(self) -> Result<GatewayClient, ConfigError> {
		self.config.validate()?;
		let backend = self.backend.ok_or(ConfigError::Missing("auth backend"))?;
		let probe = self.probe.ok_or(ConfigError::Missing("health probe"))?;
		let store: Arc<dyn SessionStore> = match self.store {
			Some(store) => store,
			None => Arc::new(MemorySessionStore::new(self.config.storage_key.clone())),
		};

		let authority = SessionAuthority::new(backend, store);
		let liveness = LivenessTracker::new(self.config.liveness.max_inactive());
		let gateway = Gateway::builder(authority.clone())
			.config(self.config.gateway.clone())
			.classifier(self.classifier)
			.liveness(liveness.clone())
			.build();
		let health = HealthMonitor::new(gateway.clone(), liveness.clone(), probe, self.config.health.clone());
		let broadcaster = self.hub.as_ref().map(BroadcastHub::join);

		Ok(GatewayClient {
			inner: Arc::new(Inner {
				config: self.config,
				authority,
				gateway,
				liveness,
				health,
				broadcaster,
				sync: Mutex::new(None),
				tasks: Mutex::new(Vec::new()),
			}),
		})
	}
}

/// Handle to a fully wired client. Cloning is cheap.
#[derive(Clone)]
pub struct GatewayClient {
	inner: Arc<Inner>,
}

struct Inner {
	config: ClientConfig,
	authority: SessionAuthority,
	gateway: Gateway,
	liveness: LivenessTracker,
	health: HealthMonitor,
	broadcaster: Option<Broadcaster>,
	sync: Mutex<Option<SessionSync>>,
	tasks: Mutex<Vec<TaskHandle>>,
}

impl GatewayClient {
	pub fn builder() -> GatewayClientBuilder {
		GatewayClientBuilder {
			config: ClientConfig::default(),
			backend: None,
			store: None,
			probe: None,
			classifier: Classifier::default(),
			hub: None,
		}
	}

	/// Restores the persisted session, starts session sync and foreground
	/// handling, and runs the initial health check.
	///
	/// Periodic checks run only if the initial check passed.
	pub async fn start(&self) -> HealthReport {
		match self.inner.authority.restore() {
			Ok(Some(session)) => debug!(target = "gate.session", user = %session.identity.id, "resuming session"),
			Ok(None) => debug!(target = "gate.session", "no persisted session"),
			Err(err) => warn!(target = "gate.session", error = %err, "could not restore session"),
		}

		if let Some(broadcaster) = &self.inner.broadcaster {
			let mut sync = self.inner.sync.lock();
			if sync.is_none() {
				*sync = Some(SessionSync::spawn(
					self.inner.authority.clone(),
					broadcaster.clone(),
					self.inner.gateway.clone(),
				));
			}
		}

		{
			let mut tasks = self.inner.tasks.lock();
			if tasks.is_empty() {
				tasks.push(self.inner.health.watch_foreground());
			}
		}

		let report = self.inner.health.start().await;
		info!(target = "gate.gateway", ok = report.ok, context = ?self.context_id(), "client started");
		report
	}

	/// Stops every background task of the client.
	pub async fn shutdown(&self) {
		self.inner.health.stop();
		let tasks: Vec<TaskHandle> = self.inner.tasks.lock().drain(..).collect();
		for task in tasks {
			task.shutdown().await;
		}
		let sync = self.inner.sync.lock().take();
		if let Some(sync) = sync {
			sync.shutdown().await;
		}
		debug!(target = "gate.gateway", "client shut down");
	}

	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	pub fn authority(&self) -> &SessionAuthority {
		&self.inner.authority
	}

	pub fn gateway(&self) -> &Gateway {
		&self.inner.gateway
	}

	pub fn liveness(&self) -> &LivenessTracker {
		&self.inner.liveness
	}

	pub fn health(&self) -> &HealthMonitor {
		&self.inner.health
	}

	/// This client's context on the broadcast hub, if it joined one.
	pub fn context_id(&self) -> Option<ContextId> {
		self.inner.broadcaster.as_ref().map(Broadcaster::id)
	}

	/// Reload generation bumped on remote sign-out. `None` until
	/// [`start`](Self::start) ran with a broadcast hub.
	pub fn reload_requests(&self) -> Option<watch::Receiver<u64>> {
		self.inner.sync.lock().as_ref().map(SessionSync::reload_requests)
	}

	/// Shorthand for [`Gateway::submit`].
	pub fn submit<T, F, Fut>(&self, op: F) -> OperationHandle<T>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
		T: Send + 'static,
	{
		self.inner.gateway.submit(op)
	}
}
