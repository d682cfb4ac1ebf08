//! fruitscan
//!
//! Shape and size classification of fruit photos from the command line.
//!
//! Every classification prints a JSON envelope on stdout; logs and the
//! optional metrics dump go to stderr so stdout stays machine-readable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fruitscan_classifiers::{AttributeClassifier, DeviceSpec, ModelRegistry};
use fruitscan_core::ClassifierKind;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "fruitscan")]
#[command(about = "Fruit shape and size classifier", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FRUITSCAN_CONFIG", default_value = "fruitscan.yaml")]
    config: PathBuf,

    /// Directory holding the weight artifacts
    #[arg(short, long, env = "FRUITSCAN_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Inference device (cpu, cuda[:N], metal[:N])
    #[arg(short, long)]
    device: Option<DeviceSpec>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one image with one classifier
    Classify {
        /// Classifier kind (shape or size)
        #[arg(short, long)]
        kind: ClassifierKind,

        /// Image file
        #[arg(short, long)]
        image: PathBuf,

        /// Weight artifact to use instead of the configured one
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Give up waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Classify one image with every classifier
    Scan {
        /// Image file
        #[arg(short, long)]
        image: PathBuf,

        /// Give up waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show architecture, input contract and label order of every classifier
    Specs,

    /// Load every classifier and report its state
    Preload,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = config::load(&cli.config, &cli)?;
    info!("Configuration loaded, models from {}", config.models_dir.display());

    let metrics_handle = if cli.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    let registry = Arc::new(ModelRegistry::new(config)?);
    let classifier = AttributeClassifier::new(Arc::clone(&registry));

    let success = match cli.command {
        Command::Classify {
            kind,
            image,
            weights,
            timeout_ms,
            pretty,
        } => {
            let result =
                commands::classify(classifier, kind, image, weights, timeout(timeout_ms)).await;
            print_json(&result, pretty)?;
            result.is_success()
        }
        Command::Scan {
            image,
            timeout_ms,
            pretty,
        } => {
            let results = commands::scan(classifier, image, timeout(timeout_ms)).await;
            print_json(&results, pretty)?;
            results.values().all(|r| r.is_success())
        }
        Command::Specs => {
            print_json(&commands::specs(&registry), true)?;
            true
        }
        Command::Preload => {
            let reports = commands::preload(classifier).await?;
            print_json(&reports, true)?;
            reports.values().all(|r| r.is_ready())
        }
    };

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn timeout(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("fruitscan=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fruitscan=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics recorder and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "fruitscan_predictions_total",
        "Classification requests by kind and outcome"
    );
    metrics::describe_histogram!(
        "fruitscan_inference_latency_us",
        metrics::Unit::Microseconds,
        "End-to-end classification latency in microseconds by kind"
    );
    metrics::describe_counter!(
        "fruitscan_model_loads_total",
        "Model load attempts by kind and outcome"
    );

    info!("Metrics recorder initialized");
    Ok(handle)
}
