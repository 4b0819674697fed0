//! Contributor profile lookups and the split of commit authors by region.

use crate::cache::JsonStore;
use crate::commits::CommitUser;
use crate::geo::{classify, Region};
use crate::github::{ApiResponse, GitHubApi};
use crate::paging::RetryPolicy;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const UNKNOWN: &str = "Unknown";
const NOT_FOUND: &str = "User Not Found";

/// Cached profile facts of one user.
///
/// Older cache files hold a bare location string per user; those still load, with no
/// email, and are rewritten in this shape on the next flush.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredProfile")]
pub struct ContributorProfile {
    pub location: String,
    pub email: Option<String>,
}

impl ContributorProfile {
    fn labelled(location: &str) -> Self {
        Self {
            location: location.to_string(),
            email: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredProfile {
    Current {
        location: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    Legacy(Option<String>),
}

impl From<StoredProfile> for ContributorProfile {
    fn from(stored: StoredProfile) -> Self {
        let (location, email) = match stored {
            StoredProfile::Current { location, email } => (location, email),
            StoredProfile::Legacy(location) => (location, None),
        };
        Self {
            location: location.unwrap_or_else(|| UNKNOWN.to_string()),
            email,
        }
    }
}

pub type LocationCache = JsonStore<ContributorProfile>;

/// Looks up one user's profile.
///
/// Rate-limited responses are waited out and retried. Returns `None` when the request
/// itself failed, so that the user is tried again on a later run.
pub async fn lookup_profile(
    api: &dyn GitHubApi,
    retry: &RetryPolicy,
    login: &str,
) -> Option<ContributorProfile> {
    loop {
        match api.user_profile(login).await {
            Ok(ApiResponse::Ok(profile)) => {
                return Some(ContributorProfile {
                    location: profile.location.unwrap_or_else(|| UNKNOWN.to_string()),
                    email: profile.email,
                })
            }
            Ok(ApiResponse::Failed(StatusCode::NOT_FOUND)) => {
                return Some(ContributorProfile::labelled(NOT_FOUND))
            }
            Ok(ApiResponse::Failed(status)) => {
                tracing::warn!(%status, login, "Profile lookup failed");
                return Some(ContributorProfile::labelled(UNKNOWN));
            }
            Ok(ApiResponse::Malformed(reason)) => {
                tracing::warn!(login, "Unreadable profile: {}", reason);
                return Some(ContributorProfile::labelled(UNKNOWN));
            }
            Ok(ApiResponse::RateLimited { retry_after }) => {
                let wait = retry.rate_limit_wait(retry_after);
                tracing::warn!("Rate limit exceeded! Pausing for {} seconds...", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                tracing::warn!(login, "Error fetching location: {:#}", e);
                return None;
            }
        }
    }
}

/// Fills `cache` with profiles of every user in `usernames` it does not hold yet.
///
/// At most `concurrency` lookups run at once. Only this function touches the cache;
/// lookups report back and their results are stored as they arrive. Returns the number
/// of new entries.
pub async fn resolve_locations(
    api: &dyn GitHubApi,
    retry: &RetryPolicy,
    cache: &mut LocationCache,
    usernames: impl IntoIterator<Item = String>,
    concurrency: usize,
    flush_interval: usize,
) -> Result<usize> {
    let mut queued = HashSet::new();
    let pending: Vec<String> = usernames
        .into_iter()
        .filter(|login| !cache.contains(login) && queued.insert(login.clone()))
        .collect();
    tracing::info!(
        "Fetching locations for {} users (cached users skipped)...",
        pending.len()
    );

    let mut lookups = stream::iter(pending)
        .map(move |login| async move {
            let profile = lookup_profile(api, retry, &login).await;
            (login, profile)
        })
        .buffer_unordered(concurrency.max(1));

    let flush_interval = flush_interval.max(1);
    let mut added = 0;
    while let Some((login, profile)) = lookups.next().await {
        let Some(profile) = profile else {
            continue;
        };
        cache.insert(login, profile);
        added += 1;
        if added % flush_interval == 0 {
            cache.flush()?;
        }
    }

    cache.flush()?;
    Ok(added)
}

/// A row of a `{repo}_authors_{region}.csv` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegionAuthor {
    #[serde(rename = "Time Frame")]
    pub timeframe: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Location")]
    pub location: String,
}

/// Groups commit authors by (repository, region name) according to their cached location.
///
/// Users without a cached profile are treated as having an unknown location.
pub fn split_by_region(
    users: &[CommitUser],
    cache: &LocationCache,
    regions: &[Region],
) -> BTreeMap<(String, String), Vec<RegionAuthor>> {
    let mut groups: BTreeMap<(String, String), Vec<RegionAuthor>> = BTreeMap::new();
    for user in users {
        let location = cache
            .get(&user.username)
            .map_or(UNKNOWN, |profile| profile.location.as_str());
        for region in classify(location, regions) {
            groups
                .entry((user.repository.clone(), region.name.clone()))
                .or_default()
                .push(RegionAuthor {
                    timeframe: user.timeframe.clone(),
                    username: user.username.clone(),
                    location: location.to_string(),
                });
        }
    }
    groups
}
