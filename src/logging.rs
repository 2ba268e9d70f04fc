use anyhow::Result;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging to a file so the chat surfaces stay clean.
/// The filter comes from `SCOUT_LOG` (or `level` when the env var is unset).
pub fn init_logging(log_path: &Path, level: &str) -> Result<()> {
    let log_file = std::sync::Arc::new(std::fs::File::create(log_path)?);
    let filter = EnvFilter::try_from_env("SCOUT_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("logging initialized");
    Ok(())
}
