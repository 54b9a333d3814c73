use serde::{Deserialize, Serialize};

/// Result data for the probe command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeData {
	pub ok: bool,
	pub latency_ms: u64,
	pub signed_in: bool,
}

/// Result data for session commands (sign-in, refresh, status).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
	pub signed_in: bool,
	pub phase: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expired: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub store_path: Option<String>,
}

/// Result data for the sign-out command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutData {
	pub had_session: bool,
	/// The platform call failed; local state was cleared regardless.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub platform_error: Option<String>,
}

/// Result data for the fetch command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchData {
	pub table: String,
	pub count: usize,
	pub rows: serde_json::Value,
}

/// One streamed line of the watch command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WatchRecord {
	Session {
		kind: String,
		local: bool,
		#[serde(skip_serializing_if = "Option::is_none")]
		user_id: Option<String>,
	},
	Health {
		ok: bool,
		latency_ms: u64,
		#[serde(skip_serializing_if = "Option::is_none")]
		error: Option<String>,
	},
}

/// Final result data of the watch command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSummary {
	pub events: usize,
	pub checks: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_ok: Option<bool>,
}
