//! Resilient request gateway for a client of a hosted backend.
//!
//! Every backend call goes through a [`Gateway`] that bounds concurrency,
//! races attempts against a deadline, retries with linear backoff and
//! recovers expired sessions through the [`SessionAuthority`]. A
//! [`HealthMonitor`] probes the connection while the client is in use, and
//! [`SessionSync`] propagates sign-out between the contexts of one client.
//!
//! [`GatewayClient`] wires all of it together:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use gate::{GatewayClient, MemorySessionStore, probe_fn};
//! # async fn demo(backend: Arc<dyn gate::AuthBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = GatewayClient::builder()
//!     .backend(backend)
//!     .store(Arc::new(MemorySessionStore::new("gate-auth")))
//!     .probe(probe_fn(|_session| async { Ok(()) }))
//!     .build()?;
//! let report = client.start().await;
//! println!("healthy: {}", report.ok);
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod session;
pub mod sync;

pub use broadcast::{BroadcastHub, Broadcaster};
pub use classify::{CREDENTIAL_SIGNATURE, Classifier, ErrorClass};
pub use client::{GatewayClient, GatewayClientBuilder};
pub use config::{ClientConfig, DEFAULT_STORAGE_KEY, GatewayConfig, HealthConfig, LivenessConfig};
pub use error::{AttemptError, AuthError, BackendError, ConfigError, GatewayError, HealthError, Result, StoreError};
pub use gate_protocol as protocol;
pub use gate_runtime::{ActivitySignal, LivenessTracker, TaskHandle};
pub use gateway::{Gateway, GatewayBuilder, OperationHandle, QueueSnapshot, RetryPolicy};
pub use health::{HealthMonitor, HealthReport, ProbeFn, probe_fn};
pub use session::{AuthBackend, AuthPhase, FileSessionStore, MemorySessionStore, SessionAuthority, SessionStore};
pub use sync::SessionSync;
