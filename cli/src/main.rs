//! CLI entrypoint for shelfscan
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod args;
mod output;
mod progress;

use anyhow::{Context, Result, bail};
use args::Cli;
use clap::Parser;
use output::ConsoleFormatter;
use progress::ProgressReporter;
use shelfscan_application::{
    AuditSink, CompositeAuditSink, RunExtractionInput, RunExtractionUseCase, RunStatus,
};
use shelfscan_domain::{ImageInput, OutputFormat};
use shelfscan_infrastructure::{ConfigLoader, JsonlAuditSink, TracingAuditSink};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the subscriber; the guard must live until exit to flush the log file
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Could not create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_image(cli: &Cli) -> Result<ImageInput> {
    match (&cli.source.image, &cli.source.image_url) {
        (Some(path), _) => {
            let data = std::fs::read(path)
                .with_context(|| format!("Could not read image {}", path.display()))?;
            Ok(ImageInput::from_bytes_with_path(data, path))
        }
        (None, Some(url)) => Ok(ImageInput::url(url.clone())),
        (None, None) => bail!("An image is required. Use --image <PATH> or --image-url <URL>."),
    }
}

/// Cancel the run on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli)?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(ExitCode::SUCCESS);
    }

    info!("Starting shelfscan");

    // === Configuration ===
    let file_config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())?
    };
    for issue in file_config.validate().iter().filter(|i| !i.is_error()) {
        warn!("{}", issue);
    }
    let config = file_config.to_extraction_config()?;
    let image = load_image(&cli)?;

    // === Dependency Injection ===
    let backend = Arc::new(file_config.providers.build_backend()?);

    let mut audit = CompositeAuditSink::new().with_sink(Arc::new(TracingAuditSink::new()));
    let audit_path = cli.audit_log.clone().or(file_config.output.audit_log.clone());
    if let Some(path) = audit_path {
        match JsonlAuditSink::new(&path) {
            Some(sink) => {
                info!("Audit log: {}", sink.path().display());
                audit = audit.with_sink(Arc::new(sink));
            }
            None => warn!("Audit log disabled: could not open {}", path.display()),
        }
    }
    let audit: Arc<dyn AuditSink> = Arc::new(audit);

    let use_case = RunExtractionUseCase::new(backend)
        .with_audit_sink(audit)
        .with_cancellation(cancel_on_ctrl_c());

    let input = RunExtractionInput::new(image, config);
    let outcome = if cli.quiet {
        use_case.execute(input).await?
    } else {
        let progress = ProgressReporter::new();
        use_case.execute_with_progress(input, &progress).await?
    };

    // === Output ===
    let format = cli
        .output
        .map(OutputFormat::from)
        .or(file_config.output.format)
        .unwrap_or_default();
    let rendered = match format {
        OutputFormat::Summary => ConsoleFormatter::format_summary(&outcome),
        OutputFormat::Json => ConsoleFormatter::format_json(&outcome),
    };
    println!("{}", rendered);

    Ok(match outcome.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(1),
        RunStatus::Escalated => ExitCode::from(2),
    })
}
