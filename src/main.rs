use std::fs::OpenOptions;
use std::path::Path;
use std::process;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use git_split::Cli;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs the stderr layer (RUST_LOG, default "warn") and, when requested,
/// an info-level plain-text layer appending to `log_file`.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    );

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("info")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn report(e: &anyhow::Error) {
    eprintln!("Error: {e}");

    // Print the full error chain if available
    let mut source = e.source();
    while let Some(err) = source {
        eprintln!("  Caused by: {err}");
        source = err.source();
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        report(&e);
        process::exit(1);
    }

    if let Err(e) = cli.execute() {
        report(&e);
        process::exit(1);
    }
}
