//! Hydrological forcing engine.
//!
//! Regrids and downscales meteorological model output onto the hydrological
//! grid, substitutes missing zero-hour forecasts, and layers primary and
//! secondary products for analysis/assimilation runs. The heavy lifting is
//! done by external NCL scripts.

mod batch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use batch::BatchRunner;
use forcing_core::config::NclEnvironment;
use forcing_core::{DryRunTransformer, ForcingConfig, ForcingEngine, NclTransformer, ProductKind, Transformer};

#[derive(Parser, Debug)]
#[command(name = "forcing-engine")]
#[command(about = "Regrid, downscale and layer meteorological forcing data")]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["regrid_downscale", "layer"])
))]
struct Args {
    /// Regrid and downscale the given input files
    #[arg(long, requires = "product")]
    regrid_downscale: bool,

    /// Layer primary and secondary products
    #[arg(long)]
    layer: bool,

    /// Product of the input files (HRRR, MRMS, NAM, GFS, RAP, CFS)
    #[arg(short, long)]
    product: Option<ProductKind>,

    /// Configuration file path
    #[arg(short, long, env = "FORCING_CONFIG", default_value = "/etc/forcing-engine/forcing.yaml")]
    config: PathBuf,

    /// Also run the shortwave downscaling pass
    #[arg(long)]
    shortwave: bool,

    /// Log the external commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Maximum files processed concurrently
    #[arg(long, default_value = "1")]
    parallel: usize,

    /// Stop after the first failed file
    #[arg(long)]
    fail_fast: bool,

    /// Log level (default: config, then info)
    #[arg(long)]
    log_level: Option<String>,

    /// Raw input files
    input_files: Vec<String>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = ForcingConfig::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    // Initialize tracing
    let level = args
        .log_level
        .as_deref()
        .or_else(|| config.log_level())
        .map(parse_level)
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        // stdout carries the batch summary
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %args.config.display(), dry_run = args.dry_run, "Starting forcing engine");

    let transformer: Arc<dyn Transformer> = if args.dry_run {
        Arc::new(DryRunTransformer::new())
    } else {
        Arc::new(NclTransformer::new(NclEnvironment::resolve(&config)))
    };
    let engine = Arc::new(ForcingEngine::new(config, transformer)?);

    let mut failed = false;

    if args.regrid_downscale {
        let product = args.product.context("--regrid-downscale requires --product")?;
        let summary = BatchRunner::new(engine.clone(), args.parallel)
            .fail_fast(args.fail_fast)
            .downscale_shortwave(args.shortwave)
            .run(product, args.input_files.clone())
            .await;

        println!("{}", serde_json::to_string_pretty(&summary)?);
        failed |= summary.has_failures();
    }

    if args.layer && !(failed && args.fail_fast) {
        // Each failed pair is already logged by the engine
        let report = engine.layer().await?;
        failed |= !report.failed.is_empty();
    }

    if failed {
        bail!("one or more files failed to process");
    }

    info!("Forcing engine finished");
    Ok(())
}
