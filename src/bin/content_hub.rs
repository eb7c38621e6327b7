//! Content hub service binary.
//!
//! The configuration file is taken from the first argument, or from
//! `CONTENT_HUB_CONFIG`; without either the built-in defaults apply.
//! Environment overrides are applied on top in every case.

use std::path::PathBuf;

use content_hub::{App, HubConfig, ProviderRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    content_hub::logging::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CONTENT_HUB_CONFIG").map(PathBuf::from));

    let config = HubConfig::load(path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    tracing::info!(env = %config.app.env, addr = %config.bind_addr(), "content-hub starting");

    let app = App::build(config, &ProviderRegistry::with_default_formats())
        .map_err(|e| anyhow::anyhow!("failed to start: {e}"))?;

    app.serve(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "content-hub exited with error");
        anyhow::anyhow!("content-hub failed: {e}")
    })?;

    tracing::info!("content-hub shut down cleanly");
    Ok(())
}
