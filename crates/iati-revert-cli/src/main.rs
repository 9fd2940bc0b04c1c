mod commands;

use clap::Parser;
use color_eyre::eyre::Result;
use commands::revert::{run_revert, RevertArgs};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "iati-revert",
    version,
    about = "Convert IATI activity files from schema 2.01 back to 1.05"
)]
struct Cli {
    /// IATI 2.01 activity file to convert
    input: PathBuf,

    /// Directory with one CSV per codelist (columns "2.01" and "1.0x")
    #[arg(long)]
    codelists: Option<PathBuf>,

    /// Write the converted document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Version written to the root element
    #[arg(long)]
    target_version: Option<String>,

    /// Also remove title/description/participating-org elements without narratives
    #[arg(long, default_value_t = false)]
    drop_empty_narratives: bool,

    /// Prefix the output with an XML declaration
    #[arg(long, default_value_t = false)]
    xml_declaration: bool,

    /// Write conversion counters as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Only print errors on the console
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Also write debug logs to daily files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn init_tracing(quiet: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // stdout carries the document, so the console layer goes to stderr.
    let console_filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = rolling::daily(dir, "iati-revert.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let cfg = iati_revert_config::load_config()?;

    let log_dir = cli.log_dir.clone().or_else(|| {
        cfg.logging
            .as_ref()
            .and_then(|l| l.dir.as_ref())
            .map(PathBuf::from)
    });
    let _guard = init_tracing(cli.quiet, log_dir.as_deref());
    debug!("CLI args: {:?}", cli);

    let input = cli.input.display().to_string();
    info!("▶ Starting conversion: {}", input);

    let args = RevertArgs::resolve(
        cli.input,
        cli.codelists,
        cli.output,
        cli.report,
        cli.target_version,
        cli.drop_empty_narratives,
        cli.xml_declaration,
        &cfg,
    );
    let result = run_revert(args);

    match &result {
        Ok(_) => info!("✔ Finished conversion: {}", input),
        Err(e) => error!("✖ Conversion of {} failed: {:?}", input, e),
    }
    result
}
