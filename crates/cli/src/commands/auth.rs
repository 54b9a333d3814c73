//! Session commands: sign-in, sign-out, refresh and status.
//!
//! All but `status` go through a [`GatewayClient`](gate::GatewayClient) so
//! the persisted session is written exactly the way a long-running client
//! writes it.

use gate::protocol::Credentials;
use gate::{AuthError, AuthPhase, SessionStore};
use tracing::{info, warn};

use super::{inputs, session_data};
use crate::cli::DEFAULT_PROBE_TABLE;
use crate::context::CommandContext;
use crate::error::Result;
use crate::http::unix_now;
use crate::output::{CommandInputs, DiagnosticLevel, ResultBuilder, SignOutData, print_result};

pub async fn sign_in(ctx: &CommandContext, email: String, password: String) -> Result<()> {
	let (client, _) = ctx.client(DEFAULT_PROBE_TABLE)?;
	let store_path = ctx.store()?.path().display().to_string();

	let session = client
		.authority()
		.sign_in(&Credentials::new(email.clone(), password))
		.await?;
	info!(target = "gatectl", user = %session.identity.id, "signed in");

	let result = ResultBuilder::new("sign-in")
		.inputs(CommandInputs {
			email: Some(email),
			..inputs(ctx)
		})
		.data(session_data(Some(&session), client.authority().phase(), Some(store_path)))
		.config(ctx.effective_config())
		.build();
	print_result(&result, ctx.format);
	Ok(())
}

pub async fn sign_out(ctx: &CommandContext) -> Result<()> {
	let (client, _) = ctx.client(DEFAULT_PROBE_TABLE)?;
	let had_session = client.authority().restore()?.is_some();

	let platform_error = match client.authority().sign_out().await {
		Ok(()) => None,
		Err(AuthError::Backend(err)) => {
			warn!(target = "gatectl", error = %err, "platform sign-out failed; local session cleared");
			Some(err.message)
		}
		Err(err) => return Err(err.into()),
	};

	let mut builder = ResultBuilder::new("sign-out").inputs(inputs(ctx));
	if let Some(message) = &platform_error {
		builder = builder.diagnostic_with_source(DiagnosticLevel::Warning, message.clone(), "platform");
	}
	let result = builder
		.data(SignOutData {
			had_session,
			platform_error,
		})
		.build();
	print_result(&result, ctx.format);
	Ok(())
}

pub async fn refresh(ctx: &CommandContext) -> Result<()> {
	let (client, _) = ctx.client(DEFAULT_PROBE_TABLE)?;
	client.authority().restore()?;

	let session = client.authority().refresh().await?;
	info!(target = "gatectl", user = %session.identity.id, expires_at = session.expires_at, "session refreshed");

	let result = ResultBuilder::new("refresh")
		.inputs(inputs(ctx))
		.data(session_data(Some(&session), client.authority().phase(), None))
		.build();
	print_result(&result, ctx.format);
	Ok(())
}

/// Sessions closer than this to expiry are flagged by `status`.
const EXPIRY_WARNING_SECS: u64 = 300;

/// Reads the persisted session only; needs neither URL nor network.
pub fn status(ctx: &CommandContext) -> Result<()> {
	let store = ctx.store()?;
	let session = store.load()?;
	let phase = match session {
		Some(_) => AuthPhase::Authenticated,
		None => AuthPhase::Unauthenticated,
	};

	let data = session_data(session.as_ref(), phase, Some(store.path().display().to_string()));
	let mut builder = ResultBuilder::new("status");
	if let Some(session) = &session {
		let now = unix_now();
		if session.is_expired_at(now) {
			builder = builder.diagnostic(DiagnosticLevel::Warning, "session expired; run `gatectl refresh`");
		} else if session.expires_within(now, EXPIRY_WARNING_SECS) {
			builder = builder.diagnostic(DiagnosticLevel::Warning, "session expires within 5 minutes");
		}
	}
	let result = builder.data(data).config(ctx.effective_config()).build();
	print_result(&result, ctx.format);
	Ok(())
}
