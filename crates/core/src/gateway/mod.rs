//! Request gateway.
//!
//! Every backend call of the client goes through [`Gateway::submit`]. The
//! gateway:
//! - admits at most `max_concurrent` operations at once, FIFO
//! - races each attempt against `request_timeout`
//! - retries timeouts and transient failures with linear backoff
//! - refreshes an expired session once per operation and re-attempts for free
//! - paces dispatch after every settlement
//!
//! # Settlement
//!
//! A submitted operation runs on its own task, so it makes progress whether or
//! not the returned [`OperationHandle`] is polled. The handle resolves exactly
//! once: with the value, with the terminal error, with
//! [`GatewayError::Cancelled`] if [`Gateway::reset`] discarded it, or with
//! [`GatewayError::Abandoned`] if the driving task was lost.
//!
//! # Example
//!
//! ```no_run
//! # use gate::{BackendError, Gateway, SessionAuthority};
//! # async fn demo(authority: SessionAuthority) -> Result<(), gate::GatewayError> {
//! let gateway = Gateway::builder(authority).build();
//! let rows = gateway
//!     .submit(|| async { Ok::<_, BackendError>(vec!["groceries".to_string()]) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod queue;
mod retry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use gate_runtime::LivenessTracker;
use tokio::sync::oneshot;
use tracing::debug;

pub use queue::QueueSnapshot;
pub use retry::RetryPolicy;

use crate::classify::{Classifier, ErrorClass};
use crate::config::GatewayConfig;
use crate::error::{BackendError, GatewayError};
use crate::session::SessionAuthority;
use queue::Dispatcher;
use retry::RetryContext;

/// Handle to the shared gateway. Cloning is cheap.
#[derive(Clone)]
pub struct Gateway {
	shared: Arc<Shared>,
}

struct Shared {
	config: GatewayConfig,
	authority: SessionAuthority,
	classifier: Classifier,
	liveness: Option<LivenessTracker>,
	dispatcher: Arc<Dispatcher>,
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
	config: GatewayConfig,
	authority: SessionAuthority,
	classifier: Classifier,
	liveness: Option<LivenessTracker>,
}

impl GatewayBuilder {
	pub fn config(mut self, config: GatewayConfig) -> Self {
		self.config = config;
		self
	}

	pub fn classifier(mut self, classifier: Classifier) -> Self {
		self.classifier = classifier;
		self
	}

	/// Records activity on `tracker` for every submission.
	pub fn liveness(mut self, tracker: LivenessTracker) -> Self {
		self.liveness = Some(tracker);
		self
	}

	pub fn build(self) -> Gateway {
		let dispatcher = Dispatcher::new(self.config.max_concurrent, self.config.dispatch_interval());
		Gateway {
			shared: Arc::new(Shared {
				config: self.config,
				authority: self.authority,
				classifier: self.classifier,
				liveness: self.liveness,
				dispatcher,
			}),
		}
	}
}

impl Gateway {
	pub fn new(config: GatewayConfig, authority: SessionAuthority, classifier: Classifier) -> Self {
		Self::builder(authority).config(config).classifier(classifier).build()
	}

	pub fn builder(authority: SessionAuthority) -> GatewayBuilder {
		GatewayBuilder {
			config: GatewayConfig::default(),
			authority,
			classifier: Classifier::default(),
			liveness: None,
		}
	}

	pub fn config(&self) -> &GatewayConfig {
		&self.shared.config
	}

	pub fn authority(&self) -> &SessionAuthority {
		&self.shared.authority
	}

	/// Submits `op` under the configured retry policy.
	///
	/// `op` is invoked once per attempt. Must be called within a tokio
	/// runtime.
	pub fn submit<T, F, Fut>(&self, op: F) -> OperationHandle<T>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
		T: Send + 'static,
	{
		self.submit_with(self.shared.config.retry_policy(), op)
	}

	/// Submits `op` under an explicit retry policy.
	pub fn submit_with<T, F, Fut>(&self, policy: RetryPolicy, op: F) -> OperationHandle<T>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
		T: Send + 'static,
	{
		if let Some(liveness) = &self.shared.liveness {
			liveness.touch();
		}

		let (id, start) = self.shared.dispatcher.enqueue();
		let (tx, rx) = oneshot::channel();
		let shared = Arc::clone(&self.shared);

		tokio::spawn(async move {
			let outcome = match start.await {
				Ok(permit) => {
					let ctx = RetryContext {
						classifier: &shared.classifier,
						authority: &shared.authority,
						timeout: shared.config.request_timeout(),
						policy,
						id: permit.id(),
					};
					let outcome = ctx.drive(&op).await;
					drop(permit);
					outcome
				}
				Err(_) => {
					debug!(target = "gate.gateway", id, "operation discarded before start");
					Err(GatewayError::Cancelled)
				}
			};
			let _ = tx.send(outcome);
		});

		let snapshot = self.shared.dispatcher.snapshot();
		debug!(
			target = "gate.gateway",
			id,
			queued = snapshot.queued,
			active = snapshot.active,
			"operation submitted"
		);

		OperationHandle { id, rx }
	}

	/// Discards all queued operations that have not started.
	///
	/// Executing operations are unaffected. Returns the number discarded.
	pub fn reset(&self) -> usize {
		let discarded = self.shared.dispatcher.reset();
		if discarded > 0 {
			debug!(target = "gate.gateway", discarded, "queue reset");
		}
		discarded
	}

	pub fn snapshot(&self) -> QueueSnapshot {
		self.shared.dispatcher.snapshot()
	}

	/// Class of the last attempt behind a terminal error, if it ever ran.
	pub fn classify(&self, err: &GatewayError) -> Option<ErrorClass> {
		err.last_attempt().map(|attempt| self.shared.classifier.classify(attempt))
	}
}

/// Pending result of a submitted operation.
#[derive(Debug)]
pub struct OperationHandle<T> {
	id: u64,
	rx: oneshot::Receiver<Result<T, GatewayError>>,
}

impl<T> OperationHandle<T> {
	/// Submission sequence number, in FIFO order.
	pub fn id(&self) -> u64 {
		self.id
	}
}

impl<T> Future for OperationHandle<T> {
	type Output = Result<T, GatewayError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|received| received.unwrap_or(Err(GatewayError::Abandoned)))
	}
}
