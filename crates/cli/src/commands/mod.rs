mod auth;
mod fetch;
mod probe;
mod watch;

use std::time::Duration;

use gate::AuthPhase;
use gate::protocol::Session;

use crate::cli::Commands;
use crate::context::CommandContext;
use crate::error::Result;
use crate::http::unix_now;
use crate::output::{CommandInputs, SessionData};

pub async fn dispatch(command: Commands, ctx: &CommandContext) -> Result<()> {
	match command {
		Commands::Probe { table } => probe::run(ctx, &table).await,
		Commands::SignIn { email, password } => auth::sign_in(ctx, email, password).await,
		Commands::SignOut => auth::sign_out(ctx).await,
		Commands::Refresh => auth::refresh(ctx).await,
		Commands::Status => auth::status(ctx),
		Commands::Fetch { table, select, limit } => fetch::run(ctx, &table, &select, limit).await,
		Commands::Watch { table, duration_secs } => watch::run(ctx, &table, duration_secs.map(Duration::from_secs)).await,
	}
}

fn inputs(ctx: &CommandContext) -> CommandInputs {
	CommandInputs {
		url: ctx.url().map(str::to_string),
		..Default::default()
	}
}

fn session_data(session: Option<&Session>, phase: AuthPhase, store_path: Option<String>) -> SessionData {
	let now = unix_now();
	SessionData {
		signed_in: session.is_some(),
		phase: phase.as_str().to_string(),
		user_id: session.map(|s| s.identity.id.clone()),
		email: session.and_then(|s| s.identity.email.clone()),
		expires_at: session.map(|s| s.expires_at),
		expired: session.map(|s| s.is_expired_at(now)),
		store_path,
	}
}
