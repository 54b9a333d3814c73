use std::time::Duration;

use anyhow::Context;
use gate::HealthReport;
use gate::protocol::SessionEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::inputs;
use crate::context::CommandContext;
use crate::error::Result;
use crate::output::{CommandInputs, ResultBuilder, WatchRecord, WatchSummary, print_line, print_result};

/// Runs a full client until Ctrl-C or `duration` elapses, streaming one JSON
/// line per session event and per health check, then prints a summary.
pub async fn run(ctx: &CommandContext, table: &str, duration: Option<Duration>) -> Result<()> {
	let (client, _) = ctx.client(table)?;
	let mut events = client.authority().subscribe();
	let mut reports = client.health().reports();

	client.start().await;
	info!(target = "gatectl", interval_ms = ctx.config.health.check_interval_ms, "watching");

	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);
	let deadline = async {
		match duration {
			Some(duration) => tokio::time::sleep_until(Instant::now() + duration).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(deadline);

	let mut summary = WatchSummary {
		events: 0,
		checks: 0,
		last_ok: None,
	};
	let mut interrupted: anyhow::Result<()> = Ok(());
	loop {
		tokio::select! {
			event = events.recv() => match event {
				Ok(event) => {
					summary.events += 1;
					print_line(&session_record(&event));
				}
				Err(RecvError::Lagged(skipped)) => warn!(target = "gatectl", skipped, "session events dropped"),
				Err(RecvError::Closed) => break,
			},
			changed = reports.changed() => {
				if changed.is_err() {
					break;
				}
				let report = reports.borrow_and_update().clone();
				if let Some(report) = report {
					summary.checks += 1;
					summary.last_ok = Some(report.ok);
					print_line(&health_record(&report));
				}
			}
			signal = &mut ctrl_c => {
				debug!(target = "gatectl", "interrupted");
				interrupted = signal.context("failed to listen for Ctrl-C");
				break;
			}
			_ = &mut deadline => break,
		}
	}

	client.shutdown().await;
	interrupted?;
	let result = ResultBuilder::new("watch")
		.inputs(CommandInputs {
			table: Some(table.to_string()),
			..inputs(ctx)
		})
		.data(summary)
		.build();
	print_result(&result, ctx.format);
	Ok(())
}

fn session_record(event: &SessionEvent) -> WatchRecord {
	WatchRecord::Session {
		kind: event.kind.as_str().to_string(),
		local: event.is_local(),
		user_id: event.session.as_ref().map(|s| s.identity.id.clone()),
	}
}

fn health_record(report: &HealthReport) -> WatchRecord {
	WatchRecord::Health {
		ok: report.ok,
		latency_ms: report.latency.as_millis() as u64,
		error: report.error.as_ref().map(ToString::to_string),
	}
}
