//! `pdm probe` – show probe info for a URL.

use anyhow::{Context, Result};
use pdm_core::config::PdmConfig;
use pdm_core::probe;

pub async fn run_probe(cfg: &PdmConfig, url: &str) -> Result<()> {
    let timeout = cfg.probe_timeout();
    let url_owned = url.to_string();
    let info = tokio::task::spawn_blocking(move || probe::try_probe(&url_owned, timeout))
        .await
        .context("probe task panicked")?
        .with_context(|| format!("probe failed for {url}"))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
