//! Prints the current core API quota.

use contributor_census::config::AppConfig;
use contributor_census::github::{GitHubApi, OctocrabClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    contributor_census::init_tracing("contributor_census=info,rate_limit=info");

    let config = AppConfig::load()?;
    let client = OctocrabClient::new(&config)?;

    match client.quota().await {
        Ok(quota) => {
            tracing::info!(
                "Core requests: {} remaining / {} total",
                quota.remaining,
                quota.limit
            );
            tracing::info!("Reset time: {} (Unix timestamp)", quota.reset);
        }
        Err(e) => tracing::error!("Failed to fetch rate limit: {:#}", e),
    }
    Ok(())
}
