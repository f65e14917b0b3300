//! intruderd - motion-triggered capture daemon
//!
//! This daemon:
//! 1. Loads configuration (tokens.env, optional JSON file, environment)
//! 2. Primes the foreground model on the first frames
//! 3. Records a clip whenever motion is detected (skipping dark scenes)
//! 4. Encrypts each clip and uploads it to the configured backend
//! 5. On SIGINT/SIGTERM or end-of-stream, drains the queue and uploads its log

use anyhow::{Context, Result};

use intruder_watch::{logging, Pipeline, PipelineConfig, ShutdownToken};

fn main() -> Result<()> {
    let config = PipelineConfig::load()?;
    let log_path = config.storage.log_path();
    logging::init(&log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;
    log::info!(
        "intruderd {} starting (camera {}, backend {:?}, captures in {})",
        env!("CARGO_PKG_VERSION"),
        config.camera.device,
        config.backend.kind(),
        config.storage.capture_dir.display()
    );

    let shutdown = ShutdownToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("install signal handler")?;

    let summary = Pipeline::from_config(&config, shutdown)?.run()?;
    match summary.exit_code() {
        0 => Ok(()),
        code => std::process::exit(code),
    }
}
