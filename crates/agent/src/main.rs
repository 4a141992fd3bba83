//! Fatigue Edge Agent - Main Entry Point
//!
//! Usage: `fatigue-agent [config.toml] < measurements.jsonl`

use std::path::PathBuf;

use agent::{init_logging, run, AgentConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AgentConfig::load(config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== Fatigue Edge Agent v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Configuration loaded");
    }

    run(config).await
}
