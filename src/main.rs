// Command-line entry point. Takes an optional path to a JSON run config;
// without a configured pipeline the operations are chosen from a menu.

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use image_pipeline_lib::commands::MenuPrompt;
use image_pipeline_lib::{BatchProcessor, RunConfig, RunReporter};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(false)         // Remove file path
        .with_line_number(false)  // Remove line numbers
        .with_thread_ids(false)   // Remove thread IDs
        .with_thread_names(true)  // Pool threads are named per worker
        .with_target(false)       // Remove module path
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .compact();

    subscriber.init();

    info!("=== Image Pipeline Starting ===");

    let config = match std::env::args().nth(1) {
        Some(path) => RunConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path))?,
        None => {
            debug!("No config given, using defaults");
            RunConfig::default()
        }
    };

    let spec = if config.pipeline.is_empty() {
        let stdin = std::io::stdin();
        MenuPrompt::new(stdin.lock(), std::io::stdout())
            .select_pipeline()
            .context("reading operation selection")?
    } else {
        config.build_pipeline()
    };
    info!("Pipeline: {}", spec);

    let processor = BatchProcessor::from_config(config);
    let report = processor
        .run(&spec)
        .await
        .with_context(|| format!("processing {}", processor.config().input_dir.display()))?;

    println!("{}", RunReporter::new(&report));
    Ok(())
}
