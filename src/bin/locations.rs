//! Looks up the profile location of every commit author and splits them by region.

use anyhow::Result;
use contributor_census::config::{AppConfig, COMMIT_USERS_FILE, LOCATION_CACHE_FILE};
use contributor_census::contributors::{self, LocationCache};
use contributor_census::geo::Region;
use contributor_census::github::OctocrabClient;
use contributor_census::paging::RetryPolicy;
use contributor_census::report;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    contributor_census::init_tracing("contributor_census=info,locations=info");

    let config = AppConfig::load()?;
    let input = config.data_path(COMMIT_USERS_FILE);
    if !input.exists() {
        tracing::error!("File {} not found!", input.display());
        return Ok(());
    }

    let users = report::read_commit_users(&input)?;
    let client = OctocrabClient::new(&config)?;
    let retry = RetryPolicy::from_config(&config);
    let mut cache = LocationCache::load(config.data_path(LOCATION_CACHE_FILE))?;

    let interrupted = tokio::select! {
        result = contributors::resolve_locations(
            &client,
            &retry,
            &mut cache,
            users.iter().map(|user| user.username.clone()),
            config.lookup_concurrency_limit,
            config.location_flush_interval,
        ) => {
            let added = result?;
            tracing::info!("Cached {} new locations.", added);
            false
        }
        _ = contributor_census::shutdown_signal() => true,
    };

    if interrupted {
        tracing::warn!("Script interrupted by user");
        cache.flush()?;
        return Ok(());
    }

    for ((repo, region), authors) in contributors::split_by_region(&users, &cache, &Region::builtin()) {
        let output = config.data_path(&format!("{repo}_authors_{region}.csv"));
        report::write_serialized(&output, &authors)?;
        tracing::info!("Saved {} authors for {} to {}", region, repo, output.display());
    }
    Ok(())
}
