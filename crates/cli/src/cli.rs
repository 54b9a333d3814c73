use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Table read by health probes unless `--table` says otherwise.
pub const DEFAULT_PROBE_TABLE: &str = "lists";

#[derive(Parser, Debug)]
#[command(name = "gatectl")]
#[command(about = "Operate a hosted backend through the resilient request gateway")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json, ndjson or text
	#[arg(short, long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Backend base URL
	#[arg(long, global = true, env = "GATE_URL")]
	pub url: Option<String>,

	/// Public API key sent with every request
	#[arg(long, global = true, env = "GATE_API_KEY", hide_env_values = true)]
	pub api_key: Option<String>,

	/// Client config file (JSON)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Directory holding the persisted session
	#[arg(long, global = true, value_name = "DIR", env = "GATE_STATE_DIR")]
	pub state_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run one health check against the backend
	Probe {
		/// Table read by the probe
		#[arg(long, default_value = DEFAULT_PROBE_TABLE)]
		table: String,
	},

	/// Sign in with email and password and persist the session
	#[command(alias = "login")]
	SignIn {
		#[arg(long)]
		email: String,
		#[arg(long, env = "GATE_PASSWORD", hide_env_values = true)]
		password: String,
	},

	/// Sign out and clear the persisted session
	#[command(alias = "logout")]
	SignOut,

	/// Exchange the refresh token for a new session
	Refresh,

	/// Show the persisted session without contacting the backend
	Status,

	/// Read rows from a table through the gateway
	Fetch {
		table: String,
		/// Column list passed as `select`
		#[arg(long, default_value = "*")]
		select: String,
		#[arg(long, default_value_t = 10)]
		limit: u32,
	},

	/// Stream session events and health checks until interrupted
	Watch {
		/// Table read by the health probe
		#[arg(long, default_value = DEFAULT_PROBE_TABLE)]
		table: String,
		/// Stop after this many seconds
		#[arg(long)]
		duration_secs: Option<u64>,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Probe { .. } => "probe",
			Commands::SignIn { .. } => "sign-in",
			Commands::SignOut => "sign-out",
			Commands::Refresh => "refresh",
			Commands::Status => "status",
			Commands::Fetch { .. } => "fetch",
			Commands::Watch { .. } => "watch",
		}
	}
}
