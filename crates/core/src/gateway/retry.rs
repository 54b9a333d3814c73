//! Attempt execution, failure classification and retry accounting.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::classify::{Classifier, ErrorClass};
use crate::error::{AttemptError, AuthError, BackendError, GatewayError};
use crate::session::SessionAuthority;

/// Counted attempts and linear backoff for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	/// Refresh the session once on a credential failure and re-attempt.
	pub recover_credentials: bool,
}

impl RetryPolicy {
	pub fn new(max_retries: u32, base_delay: Duration) -> Self {
		Self {
			max_retries: max_retries.max(1),
			base_delay,
			recover_credentials: true,
		}
	}

	/// Leaves credential failures to the caller; they count as transient.
	pub fn without_recovery(mut self) -> Self {
		self.recover_credentials = false;
		self
	}

	/// One counted attempt, no backoff.
	pub fn single_attempt() -> Self {
		Self::new(1, Duration::ZERO)
	}

	/// Delay after the `attempt`-th counted failure.
	pub fn backoff(&self, attempt: u32) -> Duration {
		self.base_delay.saturating_mul(attempt)
	}
}

/// Everything the retry loop needs from the gateway.
pub(crate) struct RetryContext<'a> {
	pub classifier: &'a Classifier,
	pub authority: &'a SessionAuthority,
	pub timeout: Duration,
	pub policy: RetryPolicy,
	pub id: u64,
}

impl RetryContext<'_> {
	/// Runs `op` until it succeeds, is rejected, or exhausts the policy.
	pub(crate) async fn drive<T, F, Fut>(&self, op: &F) -> Result<T, GatewayError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
		T: Send + 'static,
	{
		let started = Instant::now();
		let mut attempts = 0u32;
		let mut recovered = false;

		loop {
			let err = match self.attempt(op).await {
				Ok(value) => {
					debug!(
						target = "gate.gateway",
						id = self.id,
						attempts = attempts + 1,
						duration_ms = started.elapsed().as_millis() as u64,
						"operation completed"
					);
					return Ok(value);
				}
				Err(err) => err,
			};

			let mut class = self.classifier.classify(&err);
			if class == ErrorClass::CredentialExpired {
				if !self.policy.recover_credentials {
					debug!(target = "gate.gateway", id = self.id, "credential error; recovery left to caller");
				} else if !recovered && self.authority.current_session().is_some() {
					recovered = true;
					match self.authority.refresh().await {
						Ok(_) => {
							debug!(target = "gate.gateway", id = self.id, "session refreshed; re-attempting");
							continue;
						}
						Err(AuthError::Superseded) if self.authority.current_session().is_some() => {
							debug!(target = "gate.gateway", id = self.id, "session replaced during refresh; re-attempting");
							continue;
						}
						Err(refresh_err) => {
							warn!(target = "gate.gateway", id = self.id, error = %refresh_err, "session refresh failed");
						}
					}
				} else if !recovered {
					debug!(target = "gate.gateway", id = self.id, "credential error without a session");
				}
				class = ErrorClass::Transient;
			}

			if class == ErrorClass::Permanent {
				warn!(target = "gate.gateway", id = self.id, error = %err, "operation rejected");
				return Err(GatewayError::Rejected(err));
			}

			attempts += 1;
			if attempts >= self.policy.max_retries {
				error!(
					target = "gate.gateway",
					id = self.id,
					attempts,
					duration_ms = started.elapsed().as_millis() as u64,
					error = %err,
					"retries exhausted"
				);
				return Err(GatewayError::Exhausted { attempts, last: err });
			}

			let delay = self.policy.backoff(attempts);
			warn!(
				target = "gate.gateway",
				id = self.id,
				attempt = attempts,
				max = self.policy.max_retries,
				delay_ms = delay.as_millis() as u64,
				error = %err,
				"attempt failed; retrying"
			);
			tokio::time::sleep(delay).await;
		}
	}

	/// Runs one attempt on its own task and races it against the deadline.
	///
	/// On timeout the task is detached, not cancelled; whatever it produces
	/// later is dropped with its join handle.
	async fn attempt<T, F, Fut>(&self, op: &F) -> Result<T, AttemptError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
		T: Send + 'static,
	{
		let task = tokio::spawn(op());
		match tokio::time::timeout(self.timeout, task).await {
			Err(_) => Err(AttemptError::Timeout(self.timeout)),
			Ok(Err(join_err)) => Err(AttemptError::Panicked(join_err.to_string())),
			Ok(Ok(result)) => result.map_err(AttemptError::from),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_is_linear() {
		let policy = RetryPolicy::new(3, Duration::from_secs(1));
		assert_eq!(policy.backoff(1), Duration::from_secs(1));
		assert_eq!(policy.backoff(2), Duration::from_secs(2));
	}

	#[test]
	fn recovery_is_on_unless_disabled() {
		let policy = RetryPolicy::new(2, Duration::from_secs(1));
		assert!(policy.recover_credentials);
		assert!(!policy.without_recovery().recover_credentials);
		assert_eq!(policy.without_recovery().max_retries, 2);
	}

	#[test]
	fn policy_always_allows_one_attempt() {
		assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_retries, 1);
		assert_eq!(RetryPolicy::single_attempt().backoff(5), Duration::ZERO);
	}
}
