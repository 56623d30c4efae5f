use std::process::ExitCode;

use clap::Parser;
use facegate_cli::cli::{Cli, OutputMode};
use facegate_cli::commands::CommandHandler;
use facegate_cli::config::resolve_service_config;
use facegate_cli::output::render_error;
use facegate_core::errors::AppError;
use facegate_core::faces::VerificationService;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = cli.output_mode();
    init_tracing(cli.verbose);

    match run(cli, mode) {
        Ok(code) => code,
        Err(err) => {
            render_error(&err, mode);
            err.exit_code()
        }
    }
}

fn run(cli: Cli, mode: OutputMode) -> Result<ExitCode, AppError> {
    let config = resolve_service_config(&cli)?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        threshold = config.threshold,
        "service configuration resolved"
    );
    let service = VerificationService::open(&config);
    let handler: Box<dyn CommandHandler> = cli.command.into();
    handler.execute(&service, mode)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(fmt_layer);
    if tracing::subscriber::set_global_default(registry).is_err() {
        // Already initialised (tests).
    }
}
