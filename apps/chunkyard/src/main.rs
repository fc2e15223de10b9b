//! chunkyard command-line entry point.

mod app;
mod config;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    let cli = app::Cli::parse();

    let config = config::Config::load(cli.config.as_deref())?
        .with_overrides(cli.temp_root.clone(), cli.output_root.clone());

    // Initialize structured logging on stderr; stdout carries command output.
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        temp_root = %config.storage.temp_root.display(),
        output_root = %config.storage.output_root.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli.command, config))
}
