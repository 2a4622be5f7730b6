mod batch;
mod check;
mod cli;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use detect_engine::DetectionEngine;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;
    if let Some(threshold) = cli.threshold {
        cfg.detection.threshold = threshold;
    }

    // 3. Init tracing-subscriber. RUST_LOG wins over the config level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // 4. Build the detection engine.
    let engine_config =
        config::build_engine_config(&cfg).context("failed to build detection engine")?;
    let engine = DetectionEngine::new(engine_config);

    info!(
        detectors = engine.detector_count(),
        threshold = engine.threshold(),
        "detection engine ready"
    );

    // 5. Dispatch.
    match cli.command {
        Command::Check { input, json } => {
            let code = check::run(&engine, &input, json).await?;
            std::process::exit(code);
        }
        Command::Batch { file, output } => {
            batch::run(&engine, &file, output.as_deref()).await?;
        }
        Command::Serve { port } => {
            server::run(engine, port).await?;
        }
    }

    Ok(())
}
