//! Veil WB: shell startup for the blocking engine
//!
//! Installs the global allocator and logging, loads the shield
//! configuration, brings the engine up and reports once the background
//! list refresh has finished.
//!
//! Configuration is read from the file named by `VEIL_SHIELD_CONFIG`
//! (`.toml` or `.json`); defaults apply when it is unset.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use veil_shield::{Shield, ShieldConfig};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const CONFIG_ENV: &str = "VEIL_SHIELD_CONFIG";

fn load_config() -> Result<ShieldConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = ShieldConfig::from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        None => Ok(ShieldConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("Veil WB starting...");

    let config = load_config()?;
    info!(
        "{} filter lists, cache at {}",
        config.filter_lists.len(),
        config.cache.path.display()
    );

    let shield = Shield::new(config);
    let report = shield.initialize().await;
    info!("Startup: {}", serde_json::to_string(&report)?);

    match shield.wait_for_refresh().await {
        Some(summary) => {
            for (name, error) in &summary.failed {
                warn!("{}: {}", name, error);
            }
            info!(
                "Refresh done: {} ok, {} failed, {} new rules",
                summary.succeeded.len(),
                summary.failed.len(),
                summary.added
            );
        }
        None => info!("No background refresh configured"),
    }

    info!("Stats: {}", serde_json::to_string(&shield.stats())?);
    info!("Veil WB shutting down");
    Ok(())
}
