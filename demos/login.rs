//! Log in and list the account's apps.
//!
//! ```sh
//! TRACKVIA_API_KEY=... TRACKVIA_USERNAME=... TRACKVIA_PASSWORD=... \
//!     RUST_LOG=trackvia_api=debug cargo run --example login
//! ```

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trackvia_api::{ClientConfig, TrackviaApi};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let username = getenv("TRACKVIA_USERNAME")?;
    let password = getenv("TRACKVIA_PASSWORD")?;

    let api = TrackviaApi::new(config)?;
    api.login(&username, &password)
        .await
        .context("login failed")?;

    for app in api.get_apps().await? {
        info!(app_id = app.id, name = %app.name, "app");
    }
    for view in api.get_views().await? {
        info!(view_id = view.id, name = %view.name, "view");
    }

    Ok(())
}

fn getenv(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("env var {} is not set", key))
}
