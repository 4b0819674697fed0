//! Unique commit authors per repository and timeframe.

use crate::github::GitHubApi;
use crate::paging::{request_page, PageOutcome, RetryPolicy};
use crate::rate_limit::RateLimiter;
use crate::types::WorkUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A row of `commit_users.csv`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitUser {
    #[serde(rename = "Repository")]
    pub repository: String,
    #[serde(rename = "Time Frame")]
    pub timeframe: String,
    #[serde(rename = "Username")]
    pub username: String,
}

#[derive(Clone)]
pub struct CommitCollector {
    api: Arc<dyn GitHubApi>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl CommitCollector {
    pub fn new(api: Arc<dyn GitHubApi>, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            api,
            limiter,
            retry,
        }
    }

    /// Distinct author logins of the commits in `unit`, in first-seen order.
    ///
    /// Commits whose author has no GitHub account are skipped.
    pub async fn collect(&self, unit: &WorkUnit) -> Vec<CommitUser> {
        let api = self.api.as_ref();
        let mut seen = HashSet::new();
        let mut users = Vec::new();
        let mut page = 1u32;

        loop {
            let current = page;
            let what = format!("commits page {} of {}", current, unit);
            let repo = &unit.repo;
            let timeframe = &unit.timeframe;
            let commits = match request_page(api, &self.limiter, &self.retry, &what, move || {
                api.list_commits(repo, timeframe, current)
            })
            .await
            {
                PageOutcome::Items(commits) => commits,
                PageOutcome::Stop => break,
            };

            if commits.is_empty() {
                break;
            }
            tracing::debug!("Fetched {} commits from page {} for {}", commits.len(), page, unit);

            for login in commits.into_iter().filter_map(|commit| commit.login()) {
                if seen.insert(login.clone()) {
                    users.push(CommitUser {
                        repository: unit.repo.repo.clone(),
                        timeframe: unit.timeframe.label.clone(),
                        username: login,
                    });
                }
            }
            page += 1;
        }

        tracing::info!("Extracted {} unique authors from {}", users.len(), unit);
        users
    }
}
