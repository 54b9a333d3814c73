use std::sync::Arc;

use super::inputs;
use crate::cli::DEFAULT_PROBE_TABLE;
use crate::context::CommandContext;
use crate::error::Result;
use crate::output::{CommandInputs, DiagnosticLevel, FetchData, ResultBuilder, print_result};

/// Reads rows of `table` as one gateway operation.
///
/// Every attempt reads the current session, so an attempt that follows a
/// credential refresh carries the new token.
pub async fn run(ctx: &CommandContext, table: &str, select: &str, limit: u32) -> Result<()> {
	let (client, backend) = ctx.client(DEFAULT_PROBE_TABLE)?;
	client.authority().restore()?;

	let authority = client.authority().clone();
	let op_table = table.to_string();
	let columns = select.to_string();
	let rows = client
		.submit(move || {
			let backend = Arc::clone(&backend);
			let session = authority.current_session();
			let table = op_table.clone();
			let columns = columns.clone();
			async move { backend.select(session.as_ref(), &table, &columns, limit).await }
		})
		.await?;

	let count = rows.as_array().map_or(1, Vec::len);
	let mut builder = ResultBuilder::new("fetch").inputs(CommandInputs {
		table: Some(table.to_string()),
		extra: Some(serde_json::json!({ "select": select, "limit": limit })),
		..inputs(ctx)
	});
	if client.authority().current_session().is_none() {
		builder = builder.diagnostic(DiagnosticLevel::Info, "no session; rows visible to the API key only");
	}
	let result = builder
		.data(FetchData {
			table: table.to_string(),
			count,
			rows,
		})
		.build();
	print_result(&result, ctx.format);
	Ok(())
}
