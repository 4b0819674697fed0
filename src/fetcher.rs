//! Cache-backed fetching of closed pull requests and issues.
//!
//! `Fetcher` is the read-through entry point for one work unit. It:
//! 1. Returns the timeframe-level cache entry when present, without any request.
//! 2. Otherwise walks the listing endpoint page by page, keeping items created inside
//!    the unit's window.
//! 3. Enriches every resolved item with comment and review facts, reusing the
//!    item-level cache where possible.
//! 4. Stores the rows it gathered, even when paging ended early.

use crate::cache::ContributionCache;
use crate::github::{ApiResponse, GitHubApi, RawItem, Thread};
use crate::paging::{request_page, PageOutcome, RetryPolicy};
use crate::rate_limit::RateLimiter;
use crate::types::{elapsed_days, ContributionRow, DetailRecord, ItemKind, TargetSet, WorkUnit};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct Fetcher {
    api: Arc<dyn GitHubApi>,
    cache: Arc<ContributionCache>,
    targets: Arc<TargetSet>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    kind: ItemKind,
}

impl Fetcher {
    pub fn new(
        api: Arc<dyn GitHubApi>,
        cache: Arc<ContributionCache>,
        targets: Arc<TargetSet>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        kind: ItemKind,
    ) -> Self {
        Self {
            api,
            cache,
            targets,
            limiter,
            retry,
            kind,
        }
    }

    /// Retrieves the rows of a work unit, fetching them if not cached (read-through).
    ///
    /// Only a failure to write the cache file is returned as an error; request
    /// failures end paging early and the partial rows are cached as final.
    pub async fn fetch_window(&self, unit: &WorkUnit) -> Result<Vec<ContributionRow>> {
        let key = unit.cache_key();
        if let Some(rows) = self.cache.window(&key) {
            tracing::info!("Using cached data for {}", unit);
            return Ok(rows);
        }

        tracing::info!("Fetching {} for {}...", self.kind.noun(), unit);
        let rows = self.collect_window(unit).await;

        self.cache.store_window(key, rows.clone())?;
        Ok(rows)
    }

    async fn collect_window(&self, unit: &WorkUnit) -> Vec<ContributionRow> {
        let api = self.api.as_ref();
        let mut rows = Vec::new();
        let mut page = 1u32;

        loop {
            let current = page;
            let what = format!("{} page {} of {}", self.kind.noun(), current, unit);
            let kind = self.kind;
            let repo = &unit.repo;
            let items = match request_page(api, &self.limiter, &self.retry, &what, move || {
                api.list_items(repo, kind, current)
            })
            .await
            {
                PageOutcome::Items(items) => items,
                PageOutcome::Stop => break,
            };

            if items.is_empty() {
                break;
            }

            let mut any_in_window = false;
            for item in &items {
                if self.kind == ItemKind::Issue && item.is_pull_request() {
                    continue;
                }
                if !unit.timeframe.contains(item.created_at) {
                    continue;
                }
                any_in_window = true;

                if let Some(row) = self.enrich(unit, item).await {
                    rows.push(row);
                }
            }

            // Items arrive by last update, so a whole page outside the window means
            // the rest of the listing is older still.
            if !any_in_window && page > 1 {
                break;
            }
            page += 1;
        }

        tracing::info!(rows = rows.len(), "Finished {}", unit);
        rows
    }

    /// Builds the output row for one listed item.
    ///
    /// Returns `None` for unresolved items and for items whose details could not be
    /// gathered; neither affects the rest of the work unit. A failed cache write is
    /// logged and does not drop the row.
    pub async fn enrich(&self, unit: &WorkUnit, item: &RawItem) -> Option<ContributionRow> {
        let resolved_at = item.resolved_at(self.kind)?;
        let key = ContributionCache::item_key(&unit.repo, item.number);

        let detail = match self.cache.detail(&key) {
            Some(detail) => detail,
            None => {
                let detail = match self.compute_detail(unit, item, resolved_at).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::error!(number = item.number, repo = %unit.repo, "Error processing item: {:#}", e);
                        return None;
                    }
                };
                // The record stays in memory and is written again by the next flush.
                if let Err(e) = self.cache.store_detail(key, detail.clone()) {
                    tracing::error!(number = item.number, repo = %unit.repo, "Error caching item: {:#}", e);
                }
                detail
            }
        };

        let author = item.author();
        Some(ContributionRow {
            timeframe: unit.timeframe.label.clone(),
            repository: unit.repo.repo.clone(),
            number: item.number,
            opened_by_target: self.targets.contains(&author),
            author,
            detail,
        })
    }

    async fn compute_detail(
        &self,
        unit: &WorkUnit,
        item: &RawItem,
        resolved_at: DateTime<Utc>,
    ) -> Result<DetailRecord> {
        self.limiter.await_quota(self.api.as_ref()).await;

        let commenters = self.participants(unit, Thread::Comments, item.number).await?;
        let reviewers = match self.kind {
            ItemKind::PullRequest => Some(self.participants(unit, Thread::Reviews, item.number).await?),
            ItemKind::Issue => None,
        };

        Ok(DetailRecord {
            title: item.title.clone(),
            comment_count: commenters.len(),
            commented_by_target: self.targets.any(&commenters),
            review_count: reviewers.as_ref().map(BTreeSet::len),
            reviewed_by_target: reviewers.as_ref().map(|logins| self.targets.any(logins)),
            elapsed_days: elapsed_days(item.created_at, resolved_at),
        })
    }

    /// Distinct logins active on an item's thread. A failure status yields an empty set.
    async fn participants(
        &self,
        unit: &WorkUnit,
        thread: Thread,
        number: u64,
    ) -> Result<BTreeSet<String>> {
        match self.api.participants(&unit.repo, thread, number).await? {
            ApiResponse::Ok(entries) => Ok(entries.into_iter().filter_map(|p| p.login()).collect()),
            other => {
                tracing::warn!(number, repo = %unit.repo, "Could not list {:?}: {:?}", thread, other);
                Ok(BTreeSet::new())
            }
        }
    }
}
