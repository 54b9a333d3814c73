use tracing::info;

use super::inputs;
use crate::context::CommandContext;
use crate::error::Result;
use crate::output::{CommandInputs, DiagnosticLevel, ProbeData, ResultBuilder, print_result};

/// One health check, including credential recovery when signed in.
pub async fn run(ctx: &CommandContext, table: &str) -> Result<()> {
	let (client, _) = ctx.client(table)?;
	client.authority().restore()?;

	let report = client.health().check_now().await;
	info!(target = "gatectl", ok = report.ok, latency_ms = report.latency.as_millis() as u64, "probe finished");
	if let Some(err) = report.error {
		return Err(err.into());
	}

	let signed_in = client.authority().current_session().is_some();
	let mut builder = ResultBuilder::new("probe").inputs(CommandInputs {
		table: Some(table.to_string()),
		..inputs(ctx)
	});
	if !signed_in {
		builder = builder.diagnostic(DiagnosticLevel::Info, "probed anonymously with the API key");
	}
	let result = builder
		.data(ProbeData {
			ok: report.ok,
			latency_ms: report.latency.as_millis() as u64,
			signed_in,
		})
		.config(ctx.effective_config())
		.build();
	print_result(&result, ctx.format);
	Ok(())
}
