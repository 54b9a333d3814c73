use std::path::{Path, PathBuf};
use std::sync::Arc;

use gate::{ClientConfig, FileSessionStore, GatewayClient, probe_fn};
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::http::HttpBackend;
use crate::output::{EffectiveConfig, EndpointSource, OutputFormat};

const APP_DIR: &str = "gatectl";

/// Resolved global options shared by every command.
#[derive(Debug)]
pub struct CommandContext {
	pub format: OutputFormat,
	pub config: ClientConfig,
	config_path: Option<PathBuf>,
	url: Option<String>,
	endpoint_source: EndpointSource,
	api_key: Option<String>,
	state_dir: Option<PathBuf>,
}

impl CommandContext {
	/// Loads the config file named by `--config`, or the per-user default
	/// when one exists.
	pub fn new(cli: &Cli) -> Result<Self> {
		let config_path = match &cli.config {
			Some(path) => Some(path.clone()),
			None => dirs::config_dir()
				.map(|dir| dir.join(APP_DIR).join("config.json"))
				.filter(|path| path.is_file()),
		};
		let config = match &config_path {
			Some(path) => {
				debug!(target = "gatectl", path = %path.display(), "loading config");
				ClientConfig::load(path)?
			}
			None => ClientConfig::default(),
		};

		let endpoint_source = match &cli.url {
			None => EndpointSource::None,
			Some(url) if std::env::var("GATE_URL").ok().as_deref() == Some(url.as_str()) => EndpointSource::Env,
			Some(_) => EndpointSource::CliFlag,
		};

		Ok(Self {
			format: cli.format,
			config,
			config_path,
			url: cli.url.clone(),
			endpoint_source,
			api_key: cli.api_key.clone(),
			state_dir: cli.state_dir.clone(),
		})
	}

	pub fn url(&self) -> Option<&str> {
		self.url.as_deref()
	}

	pub fn state_dir(&self) -> Result<PathBuf> {
		match &self.state_dir {
			Some(dir) => Ok(dir.clone()),
			None => dirs::data_local_dir()
				.map(|dir| dir.join(APP_DIR))
				.ok_or(CliError::NoStateDir),
		}
	}

	pub fn store(&self) -> Result<FileSessionStore> {
		let dir = self.state_dir()?;
		Ok(FileSessionStore::in_dir(&dir, self.config.storage_key.clone()))
	}

	pub fn backend(&self) -> Result<HttpBackend> {
		let url = self.url.as_deref().ok_or(CliError::MissingUrl)?;
		let api_key = self.api_key.as_deref().ok_or(CliError::MissingApiKey)?;
		HttpBackend::new(url, api_key)
	}

	/// Builds a client whose health probe reads one row of `probe_table`.
	pub fn client(&self, probe_table: &str) -> Result<(GatewayClient, Arc<HttpBackend>)> {
		let backend = Arc::new(self.backend()?);
		let store = self.store()?;
		debug!(target = "gatectl", store = %store.path().display(), endpoint = %backend.base_url(), "building client");

		let probe = probe_fn({
			let backend = Arc::clone(&backend);
			let table = probe_table.to_string();
			move |session| {
				let backend = Arc::clone(&backend);
				let table = table.clone();
				async move { backend.probe(session.as_ref(), &table).await }
			}
		});

		let client = GatewayClient::builder()
			.config(self.config.clone())
			.backend(backend.clone())
			.store(Arc::new(store))
			.probe(probe)
			.build()?;
		Ok((client, backend))
	}

	pub fn effective_config(&self) -> EffectiveConfig {
		EffectiveConfig {
			endpoint: self.url.clone(),
			endpoint_source: self.endpoint_source,
			max_concurrent: self.config.gateway.max_concurrent,
			request_timeout_ms: self.config.gateway.request_timeout_ms,
			max_retries: self.config.gateway.max_retries,
			storage_key: self.config.storage_key.clone(),
			config_path: self.config_path.as_deref().map(display_path),
		}
	}
}

fn display_path(path: &Path) -> String {
	path.display().to_string()
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	fn context(args: &[&str]) -> CommandContext {
		let cli = Cli::try_parse_from(args).unwrap();
		CommandContext::new(&cli).unwrap()
	}

	#[test]
	fn explicit_config_file_is_loaded() {
		let tmp = tempfile::tempdir().unwrap();
		let path = tmp.path().join("config.json");
		std::fs::write(&path, r#"{ "gateway": { "maxRetries": 5 }, "storageKey": "lists-auth" }"#).unwrap();

		let ctx = context(&["gatectl", "--config", path.to_str().unwrap(), "status"]);
		assert_eq!(ctx.config.gateway.max_retries, 5);

		let effective = ctx.effective_config();
		assert_eq!(effective.storage_key, "lists-auth");
		assert_eq!(effective.config_path.as_deref(), path.to_str());
	}

	#[test]
	fn store_lives_in_state_dir_under_storage_key() {
		let tmp = tempfile::tempdir().unwrap();
		let ctx = context(&["gatectl", "--state-dir", tmp.path().to_str().unwrap(), "status"]);
		let store = ctx.store().unwrap();
		assert_eq!(store.path(), tmp.path().join("gate-auth.json"));
	}

	#[test]
	fn backend_requires_url_and_key() {
		let tmp = tempfile::tempdir().unwrap();
		let dir = tmp.path().to_str().unwrap();

		let ctx = context(&["gatectl", "--state-dir", dir, "--url", "https://x.io", "--api-key", "k", "status"]);
		assert!(ctx.backend().is_ok());

		let mut ctx = ctx;
		ctx.api_key = None;
		assert!(matches!(ctx.backend(), Err(CliError::MissingApiKey)));
		ctx.url = None;
		assert!(matches!(ctx.backend(), Err(CliError::MissingUrl)));
	}
}
