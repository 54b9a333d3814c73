//! Client configuration.
//!
//! Every field has a default so a config file only needs the values it
//! overrides. Durations are stored as milliseconds on disk:
//!
//! ```json
//! {
//!   "gateway": { "maxConcurrent": 3, "requestTimeoutMs": 15000 },
//!   "health": { "checkIntervalMs": 120000 },
//!   "storageKey": "gate-auth"
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gateway::RetryPolicy;

pub const DEFAULT_STORAGE_KEY: &str = "gate-auth";

/// Scheduling, timeout and retry settings of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
	/// Operations allowed to execute at once.
	pub max_concurrent: usize,
	/// Deadline of a single attempt.
	pub request_timeout_ms: u64,
	/// Counted attempts per operation.
	pub max_retries: u32,
	/// Backoff unit; attempt `n` waits `n * base_delay` before the next one.
	pub base_delay_ms: u64,
	/// Pause after each settlement before the next dispatch.
	pub dispatch_interval_ms: u64,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			max_concurrent: 3,
			request_timeout_ms: 15_000,
			max_retries: 3,
			base_delay_ms: 1_000,
			dispatch_interval_ms: 200,
		}
	}
}

impl GatewayConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn base_delay(&self) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}

	pub fn dispatch_interval(&self) -> Duration {
		Duration::from_millis(self.dispatch_interval_ms)
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(self.max_retries, self.base_delay())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_concurrent == 0 {
			return Err(ConfigError::Invalid("gateway.maxConcurrent must be at least 1".into()));
		}
		if self.max_retries == 0 {
			return Err(ConfigError::Invalid("gateway.maxRetries must be at least 1".into()));
		}
		if self.request_timeout_ms == 0 {
			return Err(ConfigError::Invalid("gateway.requestTimeoutMs must be positive".into()));
		}
		Ok(())
	}
}

/// Connection health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
	pub check_interval_ms: u64,
	/// Counted attempts for one probe.
	pub probe_retries: u32,
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			check_interval_ms: 120_000,
			probe_retries: 1,
		}
	}
}

impl HealthConfig {
	pub fn check_interval(&self) -> Duration {
		Duration::from_millis(self.check_interval_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessConfig {
	pub max_inactive_ms: u64,
}

impl Default for LivenessConfig {
	fn default() -> Self {
		Self {
			max_inactive_ms: gate_runtime::DEFAULT_MAX_INACTIVE.as_millis() as u64,
		}
	}
}

impl LivenessConfig {
	pub fn max_inactive(&self) -> Duration {
		Duration::from_millis(self.max_inactive_ms)
	}
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	pub gateway: GatewayConfig,
	pub health: HealthConfig,
	pub liveness: LivenessConfig,
	/// Key the persisted session is stored under.
	pub storage_key: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			gateway: GatewayConfig::default(),
			health: HealthConfig::default(),
			liveness: LivenessConfig::default(),
			storage_key: DEFAULT_STORAGE_KEY.to_string(),
		}
	}
}

impl ClientConfig {
	/// Loads and validates a JSON config file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		self.gateway.validate()?;
		if self.health.probe_retries == 0 {
			return Err(ConfigError::Invalid("health.probeRetries must be at least 1".into()));
		}
		if self.storage_key.trim().is_empty() {
			return Err(ConfigError::Invalid("storageKey must not be empty".into()));
		}
		Ok(())
	}
}
