//! Access to the GitHub REST API.
//!
//! `GitHubApi` is the seam every pipeline talks through. `OctocrabClient` is the
//! production implementation; tests substitute an in-memory one.

use crate::config::AppConfig;
use crate::types::{ItemKind, RepoId, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::RETRY_AFTER;
use http::{StatusCode, Uri};
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a request that reached the API.
///
/// Transport failures are reported through the surrounding `Result`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiResponse<T> {
    Ok(T),
    /// 403 or 429; `retry_after` carries the provider's advice in seconds.
    RateLimited { retry_after: Option<u64> },
    Failed(StatusCode),
    /// A success status whose body could not be decoded. Retrying will not help.
    Malformed(String),
}

impl<T> ApiResponse<T> {
    fn decode<U>(self, decode: impl FnOnce(T) -> Result<U, String>) -> ApiResponse<U> {
        match self {
            Self::Ok(body) => match decode(body) {
                Ok(value) => ApiResponse::Ok(value),
                Err(reason) => ApiResponse::Malformed(reason),
            },
            Self::RateLimited { retry_after } => ApiResponse::RateLimited { retry_after },
            Self::Failed(status) => ApiResponse::Failed(status),
            Self::Malformed(reason) => ApiResponse::Malformed(reason),
        }
    }
}

/// Remaining core quota and the epoch second at which it resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}

impl Quota {
    /// Stand-in used when the quota cannot be read.
    pub const fn unknown() -> Self {
        Self {
            limit: 0,
            remaining: 0,
            reset: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub login: Option<String>,
}

/// A pull request or issue as returned by a listing endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub user: Option<Account>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Present on issue listings when the entry is really a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl RawItem {
    /// Author login, or "ghost" for deleted accounts.
    pub fn author(&self) -> String {
        self.user
            .as_ref()
            .and_then(|user| user.login.clone())
            .unwrap_or_else(|| "ghost".to_string())
    }

    /// Merge time for pull requests, close time for issues.
    pub fn resolved_at(&self, kind: ItemKind) -> Option<DateTime<Utc>> {
        match kind {
            ItemKind::PullRequest => self.merged_at,
            ItemKind::Issue => self.closed_at,
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// A comment or review; only its author matters here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user: Option<Account>,
}

impl Participant {
    pub fn login(self) -> Option<String> {
        self.user.and_then(|user| user.login)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// The linked GitHub account; absent when the commit email maps to no account.
    pub author: Option<Account>,
}

impl CommitSummary {
    pub fn login(self) -> Option<String> {
        self.author.and_then(|author| author.login)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub location: Option<String>,
    pub email: Option<String>,
}

/// Per-item sub-resource listing contributor activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Thread {
    Comments,
    Reviews,
}

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Reads the core rate limit. An error means the quota could not be determined.
    async fn quota(&self) -> Result<Quota>;

    /// One page of closed pull requests or issues, most recently updated first.
    async fn list_items(
        &self,
        repo: &RepoId,
        kind: ItemKind,
        page: u32,
    ) -> Result<ApiResponse<Vec<RawItem>>>;

    /// Authors of the comments or reviews on item `number`.
    async fn participants(
        &self,
        repo: &RepoId,
        thread: Thread,
        number: u64,
    ) -> Result<ApiResponse<Vec<Participant>>>;

    /// One page of commits authored inside `timeframe`.
    async fn list_commits(
        &self,
        repo: &RepoId,
        timeframe: &Timeframe,
        page: u32,
    ) -> Result<ApiResponse<Vec<CommitSummary>>>;

    async fn user_profile(&self, login: &str) -> Result<ApiResponse<UserProfile>>;
}

const PER_PAGE: u32 = 100;

#[derive(Clone)]
pub struct OctocrabClient {
    octocrab: Octocrab,
    lookup_timeout: Duration,
}

impl OctocrabClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = &config.github_token {
            builder = builder.personal_token(token.clone());
        }
        if let Some(url) = &config.github_api_url {
            let base_uri: Uri = url
                .parse()
                .with_context(|| format!("invalid GITHUB_API_URL '{url}'"))?;
            builder = builder.base_uri(base_uri)?;
        }

        Ok(Self {
            octocrab: builder.build()?,
            lookup_timeout: config.lookup_timeout(),
        })
    }

    async fn get_body(&self, path: &str) -> Result<ApiResponse<String>> {
        let uri: Uri = path
            .parse()
            .with_context(|| format!("invalid request path {path}"))?;
        let response = self.octocrab._get(uri).await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok());
            return Ok(ApiResponse::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Ok(ApiResponse::Failed(status));
        }

        Ok(ApiResponse::Ok(self.octocrab.body_to_string(response).await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: String) -> Result<ApiResponse<T>> {
        let response = self.get_body(&path).await?;
        Ok(response.decode(|body| {
            serde_json::from_str(&body).map_err(|e| format!("unexpected response body from {path}: {e}"))
        }))
    }

    /// Fetches a JSON array, decoding each entry on its own.
    async fn get_list<T: DeserializeOwned>(&self, path: String) -> Result<ApiResponse<Vec<T>>> {
        let response = self.get_body(&path).await?;
        Ok(response.decode(|body| decode_entries(&body, &path)))
    }
}

/// Decodes a JSON array body. Entries that do not fit `T` are logged and skipped.
fn decode_entries<T: DeserializeOwned>(body: &str, path: &str) -> Result<Vec<T>, String> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| format!("expected a JSON array from {path}: {e}"))?;

    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(index, "Skipping malformed entry from {}: {}", path, e);
                None
            }
        })
        .collect())
}

fn listing_path(repo: &RepoId, kind: ItemKind, page: u32) -> String {
    let endpoint = match kind {
        ItemKind::PullRequest => "pulls",
        ItemKind::Issue => "issues",
    };
    format!(
        "/repos/{}/{}/{}?state=closed&sort=updated&direction=desc&per_page={}&page={}",
        repo.owner, repo.repo, endpoint, PER_PAGE, page
    )
}

fn participants_path(repo: &RepoId, thread: Thread, number: u64) -> String {
    let resource = match thread {
        Thread::Comments => "issues",
        Thread::Reviews => "pulls",
    };
    let listing = match thread {
        Thread::Comments => "comments",
        Thread::Reviews => "reviews",
    };
    format!(
        "/repos/{}/{}/{}/{}/{}?per_page={}",
        repo.owner, repo.repo, resource, number, listing, PER_PAGE
    )
}

fn commits_path(repo: &RepoId, timeframe: &Timeframe, page: u32) -> String {
    format!(
        "/repos/{}/{}/commits?since={}&until={}&per_page={}&page={}",
        repo.owner,
        repo.repo,
        timeframe.since.to_rfc3339_opts(SecondsFormat::Secs, true),
        timeframe.until.to_rfc3339_opts(SecondsFormat::Secs, true),
        PER_PAGE,
        page
    )
}

#[async_trait]
impl GitHubApi for OctocrabClient {
    async fn quota(&self) -> Result<Quota> {
        let limits = self.octocrab.ratelimit().get().await?;
        let core = limits.resources.core;
        Ok(Quota {
            limit: u64::try_from(core.limit).unwrap_or(u64::MAX),
            remaining: u64::try_from(core.remaining).unwrap_or(u64::MAX),
            reset: i64::try_from(core.reset).unwrap_or(i64::MAX),
        })
    }

    async fn list_items(
        &self,
        repo: &RepoId,
        kind: ItemKind,
        page: u32,
    ) -> Result<ApiResponse<Vec<RawItem>>> {
        self.get_list(listing_path(repo, kind, page)).await
    }

    async fn participants(
        &self,
        repo: &RepoId,
        thread: Thread,
        number: u64,
    ) -> Result<ApiResponse<Vec<Participant>>> {
        self.get_list(participants_path(repo, thread, number)).await
    }

    async fn list_commits(
        &self,
        repo: &RepoId,
        timeframe: &Timeframe,
        page: u32,
    ) -> Result<ApiResponse<Vec<CommitSummary>>> {
        self.get_list(commits_path(repo, timeframe, page)).await
    }

    async fn user_profile(&self, login: &str) -> Result<ApiResponse<UserProfile>> {
        tokio::time::timeout(self.lookup_timeout, self.get_json(format!("/users/{login}")))
            .await
            .with_context(|| format!("profile lookup for {login} timed out"))?
    }
}
