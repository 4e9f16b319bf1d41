use std::path::Path;

use anyhow::Result;
use log::info;

use outreach_core::config::Config;
use outreach_core::store::LocalStore;

/// Smoke entry point: loads configuration, opens the local store (running
/// migrations on the relational backend) and reports which backend is
/// active. Embedding applications wire up `Services` themselves with
/// their platform's remote transport and message sender.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "outreach.json".to_string());
    let config = Config::load(Path::new(&config_path))?;

    let store = LocalStore::open(&config).await?;
    info!(
        "local store ready ({} backend), sync every {}s, delivery poll every {}s",
        store.backend_name(),
        config.sync_interval_secs,
        config.delivery_poll_secs
    );
    Ok(())
}
