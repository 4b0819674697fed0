//! Writes the unique commit authors of every repository and timeframe to `commit_users.csv`.

use contributor_census::config::AppConfig;
use contributor_census::github::OctocrabClient;
use contributor_census::pipeline;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    contributor_census::init_tracing("contributor_census=info,commit_authors=info");

    let config = AppConfig::load()?;
    let api = Arc::new(OctocrabClient::new(&config)?);

    tokio::select! {
        result = pipeline::run_commit_authors(&config, api) => {
            result?;
        }
        _ = contributor_census::shutdown_signal() => {
            tracing::warn!("Script interrupted by user");
        }
    }
    Ok(())
}
