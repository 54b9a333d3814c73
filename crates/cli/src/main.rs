use clap::Parser;
use gate_cli::cli::Cli;
use gate_cli::commands;
use gate_cli::context::CommandContext;
use gate_cli::logging;
use gate_cli::output::{ResultBuilder, print_result};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();
	let outcome = match CommandContext::new(&cli) {
		Ok(ctx) => commands::dispatch(cli.command, &ctx).await,
		Err(err) => Err(err),
	};

	if let Err(err) = outcome {
		error!(target = "gatectl", error = %err, "command failed");
		let builder = ResultBuilder::<()>::new(command);
		let builder = match err.details() {
			Some(details) => builder.error_with_details(err.code(), err.to_string(), details),
			None => builder.error(err.code(), err.to_string()),
		};
		print_result(&builder.build(), format);
		std::process::exit(1);
	}
}
