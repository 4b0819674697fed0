//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which governs behavior such as the studied repositories
//! and timeframes, rate limit guards, retry policy, concurrency and file locations.
//! Every setting has a default, so running a binary with an empty environment reproduces
//! the original study.

use crate::types::{ItemKind, RepoId, Timeframe};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

/// Cache and output file names of a contribution pipeline, relative to `data_dir`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineFiles {
    /// Timeframe-level cache.
    pub windows: &'static str,
    /// Item-level cache.
    pub details: &'static str,
    /// Output table.
    pub output: &'static str,
}

impl ItemKind {
    pub const fn files(self) -> PipelineFiles {
        match self {
            Self::PullRequest => PipelineFiles {
                windows: "cached_prs.json",
                details: "cached_pr_details.json",
                output: "swedish_contributor_prs.csv",
            },
            Self::Issue => PipelineFiles {
                windows: "cached_issues.json",
                details: "cached_issue_details.json",
                output: "swedish_contributor_issues.csv",
            },
        }
    }
}

pub const COMMIT_USERS_FILE: &str = "commit_users.csv";
pub const LOCATION_CACHE_FILE: &str = "github_locations_cache.json";

const DEFAULT_REPOSITORIES: &str = "vuejs/vue,electron/electron,freeCodeCamp/freeCodeCamp,\
kubernetes/kubernetes,n8n-io/n8n,pytorch/pytorch,facebook/react,apache/superset,\
tensorflow/tensorflow,microsoft/vscode,ytdl-org/youtube-dl";

const DEFAULT_TIMEFRAMES: &str = "2018_2019=2018-01-01T00:00:00Z/2019-12-31T23:59:59Z,\
2020_2022=2020-01-01T00:00:00Z/2022-06-30T23:59:59Z,\
2022_2024=2022-06-01T00:00:00Z/2024-06-30T23:59:59Z";

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Optional GitHub Personal Access Token for higher rate limits.
    pub github_token: Option<String>,

    /// Alternate API base URL, e.g. for GitHub Enterprise.
    pub github_api_url: Option<String>,

    /// Repositories to study.
    /// Expected format: comma-separated string of "owner/repo" pairs.
    /// Example: "facebook/react,rust-lang/rust"
    #[serde(
        default = "default_repositories",
        deserialize_with = "deserialize_repositories"
    )]
    pub repositories: Vec<RepoId>,

    /// Study windows.
    /// Expected format: comma-separated "label=since/until" with RFC 3339 timestamps.
    #[serde(
        default = "default_timeframes",
        deserialize_with = "deserialize_timeframes"
    )]
    pub timeframes: Vec<Timeframe>,

    /// Maximum number of repository/timeframe fetches in flight at once.
    #[serde(default = "default_repo_concurrency_limit")]
    pub repo_concurrency_limit: usize,

    /// Maximum number of concurrent user profile lookups.
    #[serde(default = "default_lookup_concurrency_limit")]
    pub lookup_concurrency_limit: usize,

    /// Per-request timeout for user profile lookups, in seconds.
    #[serde(default = "default_lookup_timeout_seconds")]
    pub lookup_timeout_seconds: u64,

    /// The item-level cache is written to disk after this many new records.
    #[serde(default = "default_detail_flush_interval")]
    pub detail_flush_interval: usize,

    /// The location cache is written to disk after this many new lookups.
    #[serde(default = "default_location_flush_interval")]
    pub location_flush_interval: usize,

    /// Requests are held back when fewer than this many remain in the quota.
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: u64,

    /// Extra wait added past the quota reset time, in seconds.
    #[serde(default = "default_rate_limit_margin_seconds")]
    pub rate_limit_margin_seconds: u64,

    /// Wait applied to a rate-limited response that carries no Retry-After header.
    #[serde(default = "default_retry_after_seconds")]
    pub default_retry_after_seconds: u64,

    /// Initial delay before retrying after a transport failure, doubled per attempt.
    #[serde(default = "default_transport_retry_delay_seconds")]
    pub transport_retry_delay_seconds: u64,

    /// Consecutive transport failures tolerated on one page before giving up on it.
    #[serde(default = "default_transport_max_retries")]
    pub transport_max_retries: u32,

    /// Directory holding every input, cache and output file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// CSV file (relative to `data_dir`) whose `Username` column lists target contributors.
    #[serde(default = "default_target_users_file")]
    pub target_users_file: String,
}

fn default_repositories() -> Vec<RepoId> {
    parse_repositories(DEFAULT_REPOSITORIES)
}

fn default_timeframes() -> Vec<Timeframe> {
    // The built-in list is known to parse.
    parse_timeframes(DEFAULT_TIMEFRAMES).unwrap_or_default()
}

fn default_repo_concurrency_limit() -> usize {
    3
}

fn default_lookup_concurrency_limit() -> usize {
    5
}

fn default_lookup_timeout_seconds() -> u64 {
    5
}

fn default_detail_flush_interval() -> usize {
    10
}

fn default_location_flush_interval() -> usize {
    100
}

fn default_rate_limit_threshold() -> u64 {
    10
}

fn default_rate_limit_margin_seconds() -> u64 {
    10
}

fn default_retry_after_seconds() -> u64 {
    60
}

fn default_transport_retry_delay_seconds() -> u64 {
    5
}

fn default_transport_max_retries() -> u32 {
    5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_target_users_file() -> String {
    "repos_sweden_users.csv".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: None,
            repositories: default_repositories(),
            timeframes: default_timeframes(),
            repo_concurrency_limit: default_repo_concurrency_limit(),
            lookup_concurrency_limit: default_lookup_concurrency_limit(),
            lookup_timeout_seconds: default_lookup_timeout_seconds(),
            detail_flush_interval: default_detail_flush_interval(),
            location_flush_interval: default_location_flush_interval(),
            rate_limit_threshold: default_rate_limit_threshold(),
            rate_limit_margin_seconds: default_rate_limit_margin_seconds(),
            default_retry_after_seconds: default_retry_after_seconds(),
            transport_retry_delay_seconds: default_transport_retry_delay_seconds(),
            transport_max_retries: default_transport_max_retries(),
            data_dir: default_data_dir(),
            target_users_file: default_target_users_file(),
        }
    }
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn load() -> Result<Self, envy::Error> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn lookup_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.lookup_timeout_seconds)
    }

    pub fn data_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

fn deserialize_repositories<'de, D>(deserializer: D) -> Result<Vec<RepoId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_repositories(&s))
}

fn deserialize_timeframes<'de, D>(deserializer: D) -> Result<Vec<Timeframe>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_timeframes(&s).map_err(de::Error::custom)
}

fn parse_repositories(s: &str) -> Vec<RepoId> {
    s.split(',')
        .filter_map(|part| {
            let (owner, repo) = part.trim().split_once('/')?;
            let (owner, repo) = (owner.trim(), repo.trim());
            if owner.is_empty() || repo.is_empty() || repo.contains('/') {
                return None;
            }
            Some(RepoId::new(owner, repo))
        })
        .collect()
}

fn parse_timeframes(s: &str) -> Result<Vec<Timeframe>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (label, range) = part
                .split_once('=')
                .ok_or_else(|| format!("timeframe '{part}' is not of the form label=since/until"))?;
            let (since, until) = range
                .split_once('/')
                .ok_or_else(|| format!("timeframe '{part}' is missing '/' between since and until"))?;
            let since = parse_instant(since)?;
            let until = parse_instant(until)?;
            if since > until {
                return Err(format!("timeframe '{part}' ends before it starts"));
            }
            Ok(Timeframe {
                label: label.trim().to_string(),
                since,
                until,
            })
        })
        .collect()
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s.trim(), e))
}
