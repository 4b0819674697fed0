//! Runs work units concurrently and turns their rows into output tables.

use crate::cache::ContributionCache;
use crate::commits::{CommitCollector, CommitUser};
use crate::config::{AppConfig, COMMIT_USERS_FILE};
use crate::fetcher::Fetcher;
use crate::github::{GitHubApi, OctocrabClient};
use crate::paging::RetryPolicy;
use crate::rate_limit::RateLimiter;
use crate::report;
use crate::types::{ContributionRow, ItemKind, WorkUnit};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Spawns `job` once per work unit with at most `limit` running at a time.
///
/// Results are collected in completion order. A unit whose job fails or panics is
/// logged and contributes nothing; its siblings are unaffected.
pub async fn run_bounded<T, F, Fut>(units: Vec<WorkUnit>, limit: usize, job: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(WorkUnit) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(limit.max(1)));
    let total = units.len();
    let mut tasks = JoinSet::new();

    for unit in units {
        let gate = Arc::clone(&gate);
        let label = unit.to_string();
        let work = job(unit);
        tasks.spawn(async move {
            let _permit = gate.acquire_owned().await?;
            work.await.with_context(|| format!("work unit {label} failed"))
        });
    }

    let mut collected = Vec::new();
    let mut completed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok(Ok(rows)) => collected.extend(rows),
            Ok(Err(e)) => tracing::error!("Task error: {:#}", e),
            Err(e) => tracing::error!("Task error: {}", e),
        }
        let progress = completed as f64 / total as f64 * 100.0;
        tracing::info!(
            "Progress: {:.2}% ({}/{} tasks completed)",
            progress,
            completed,
            total
        );
    }

    collected
}

/// Fetches every configured repository and timeframe and writes the output table.
///
/// Returns the number of rows written.
pub async fn run_contributions(
    config: &AppConfig,
    api: Arc<dyn GitHubApi>,
    cache: Arc<ContributionCache>,
    kind: ItemKind,
) -> Result<usize> {
    let targets_path = config.data_path(&config.target_users_file);
    let targets = Arc::new(report::read_target_set(&targets_path)?);
    tracing::info!("Loaded {} unique target contributors.", targets.len());
    tracing::info!(
        "Loaded {} cached {} windows and {} cached details.",
        cache.window_count(),
        kind.noun(),
        cache.detail_count()
    );

    let limiter = RateLimiter::from_config(config);
    let quota = limiter.check_quota(api.as_ref()).await;
    tracing::info!("Rate limit remaining: {}", quota.remaining);

    let fetcher = Fetcher::new(
        api,
        Arc::clone(&cache),
        targets,
        limiter,
        RetryPolicy::from_config(config),
        kind,
    );
    let units = WorkUnit::cross_product(&config.repositories, &config.timeframes);
    let rows: Vec<ContributionRow> = run_bounded(units, config.repo_concurrency_limit, |unit| {
        let fetcher = fetcher.clone();
        async move { fetcher.fetch_window(&unit).await }
    })
    .await;

    cache.flush_all()?;

    let output = config.data_path(kind.files().output);
    report::write_contributions(&output, kind, &rows)?;
    tracing::info!("Data saved to {}", output.display());
    tracing::info!("Total {} analyzed: {}", kind.noun(), rows.len());
    Ok(rows.len())
}

/// Entry point shared by the `pull_requests` and `issues` binaries.
///
/// An interrupt stops the run and writes both caches as they stand.
pub async fn run_contribution_script(kind: ItemKind) -> Result<()> {
    let started = Instant::now();
    let config = AppConfig::load()?;
    let api = Arc::new(OctocrabClient::new(&config)?);
    let cache = Arc::new(ContributionCache::for_pipeline(&config, kind)?);

    let interrupted = tokio::select! {
        result = run_contributions(&config, api, Arc::clone(&cache), kind) => {
            result?;
            false
        }
        _ = crate::shutdown_signal() => true,
    };

    if interrupted {
        tracing::warn!("Script interrupted by user");
        cache.flush_all()?;
    } else {
        tracing::info!(
            "Script completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Collects commit author logins for every configured repository and timeframe.
///
/// Returns the number of (repository, timeframe, user) rows written.
pub async fn run_commit_authors(config: &AppConfig, api: Arc<dyn GitHubApi>) -> Result<usize> {
    let collector = CommitCollector::new(
        api,
        RateLimiter::from_config(config),
        RetryPolicy::from_config(config),
    );
    let units = WorkUnit::cross_product(&config.repositories, &config.timeframes);
    let users: Vec<CommitUser> = run_bounded(units, config.repo_concurrency_limit, |unit| {
        let collector = collector.clone();
        async move { Ok::<_, anyhow::Error>(collector.collect(&unit).await) }
    })
    .await;

    let output = config.data_path(COMMIT_USERS_FILE);
    report::write_commit_users(&output, &users)?;
    tracing::info!("Saved {} commit authors to {}", users.len(), output.display());
    Ok(users.len())
}
