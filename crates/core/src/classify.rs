//! Failure classification.
//!
//! The gateway holds no backend knowledge beyond this rule: a caller-supplied
//! predicate decides which backend errors mean "the session needs a refresh",
//! and an optional second predicate marks errors that must never be retried.

use std::fmt;
use std::sync::Arc;

use crate::error::{AttemptError, BackendError};

/// Message fragment identifying expired or invalid access tokens.
pub const CREDENTIAL_SIGNATURE: &str = "JWT";

/// How the gateway reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// The attempt exceeded its deadline. Retried with backoff.
	Timeout,
	/// The credential was rejected. Refresh once, then treat as transient.
	CredentialExpired,
	/// Any other failure. Retried with backoff.
	Transient,
	/// Never retried.
	Permanent,
}

type Predicate = Arc<dyn Fn(&BackendError) -> bool + Send + Sync>;

/// Classifies attempt failures using caller-supplied predicates.
#[derive(Clone)]
pub struct Classifier {
	credential: Predicate,
	permanent: Option<Predicate>,
}

impl Classifier {
	/// Creates a classifier from a credential-error predicate.
	pub fn new<F>(credential: F) -> Self
	where
		F: Fn(&BackendError) -> bool + Send + Sync + 'static,
	{
		Self {
			credential: Arc::new(credential),
			permanent: None,
		}
	}

	/// Adds a predicate for errors that must be surfaced without retrying.
	pub fn with_permanent<F>(mut self, permanent: F) -> Self
	where
		F: Fn(&BackendError) -> bool + Send + Sync + 'static,
	{
		self.permanent = Some(Arc::new(permanent));
		self
	}

	pub fn is_credential_error(&self, err: &BackendError) -> bool {
		(self.credential)(err)
	}

	pub fn classify(&self, err: &AttemptError) -> ErrorClass {
		match err {
			AttemptError::Timeout(_) => ErrorClass::Timeout,
			AttemptError::Panicked(_) => ErrorClass::Permanent,
			AttemptError::Backend(err) if self.is_credential_error(err) => ErrorClass::CredentialExpired,
			AttemptError::Backend(err) if self.permanent.as_ref().is_some_and(|p| p(err)) => ErrorClass::Permanent,
			AttemptError::Backend(_) => ErrorClass::Transient,
		}
	}
}

impl Default for Classifier {
	/// Matches [`CREDENTIAL_SIGNATURE`] in the message or an HTTP 401.
	fn default() -> Self {
		Self::new(|err| err.message.contains(CREDENTIAL_SIGNATURE) || err.status == Some(401))
	}
}

impl fmt::Debug for Classifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Classifier").field("permanent", &self.permanent.is_some()).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[test]
	fn default_matches_jwt_signature_and_401() {
		let classifier = Classifier::default();
		let expired = AttemptError::from(BackendError::new("JWT expired"));
		let unauthorized = AttemptError::from(BackendError::new("unauthorized").with_status(401));
		let other = AttemptError::from(BackendError::new("connection reset"));

		assert_eq!(classifier.classify(&expired), ErrorClass::CredentialExpired);
		assert_eq!(classifier.classify(&unauthorized), ErrorClass::CredentialExpired);
		assert_eq!(classifier.classify(&other), ErrorClass::Transient);
	}

	#[test]
	fn timeouts_and_panics_are_structural() {
		let classifier = Classifier::default();
		assert_eq!(classifier.classify(&AttemptError::Timeout(Duration::from_secs(1))), ErrorClass::Timeout);
		assert_eq!(classifier.classify(&AttemptError::Panicked("boom".into())), ErrorClass::Permanent);
	}

	#[test]
	fn permanent_predicate_applies_after_credential_check() {
		let classifier = Classifier::new(|e| e.code.as_deref() == Some("PGRST301")).with_permanent(|e| e.status.is_some_and(|s| (400..500).contains(&s)));

		let bad_request = AttemptError::from(BackendError::new("malformed").with_status(400));
		let expired = AttemptError::from(BackendError::new("expired").with_code("PGRST301").with_status(401));
		let unavailable = AttemptError::from(BackendError::new("unavailable").with_status(503));

		assert_eq!(classifier.classify(&bad_request), ErrorClass::Permanent);
		assert_eq!(classifier.classify(&expired), ErrorClass::CredentialExpired);
		assert_eq!(classifier.classify(&unavailable), ErrorClass::Transient);
	}
}
