//! In-memory stand-in for the GitHub API, shared by the integration tests.
#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contributor_census::cache::ContributionCache;
use contributor_census::github::{
    Account, ApiResponse, CommitSummary, GitHubApi, Participant, Quota, RawItem, Thread,
    UserProfile,
};
use contributor_census::paging::RetryPolicy;
use contributor_census::rate_limit::RateLimiter;
use contributor_census::types::{ItemKind, RepoId, Timeframe, WorkUnit};
use http::StatusCode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A reply served instead of a page's items, once per scripted entry.
#[derive(Clone, Debug)]
pub enum Interruption {
    RateLimited(Option<u64>),
    Status(StatusCode),
    Malformed,
    Transport,
}

#[derive(Clone, Debug)]
pub enum ProfileReply {
    Found(Option<&'static str>),
    Status(StatusCode),
    Transport,
}

#[derive(Clone, Debug, Default)]
pub struct Calls {
    /// (repository, page) of every listing request, in order.
    pub listing: Vec<(String, u32)>,
    pub participants: usize,
    pub quota: usize,
    pub commits: Vec<u32>,
    pub profiles: Vec<String>,
}

#[derive(Default)]
pub struct FakeGitHub {
    pages: Vec<Vec<RawItem>>,
    interruptions: Mutex<HashMap<u32, VecDeque<Interruption>>>,
    comments: HashMap<u64, Vec<String>>,
    reviews: HashMap<u64, Vec<String>>,
    commit_pages: Vec<Vec<Option<String>>>,
    profiles: HashMap<String, ProfileReply>,
    rate_limited_profiles: Mutex<HashSet<String>>,
    /// `None` entries fail the quota request.
    quotas: Mutex<VecDeque<Option<Quota>>>,
    calls: Mutex<Calls>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page `n` of every listing serves `pages[n - 1]`; later pages are empty.
    pub fn with_pages(mut self, pages: Vec<Vec<RawItem>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_interruption(self, page: u32, interruption: Interruption) -> Self {
        self.interruptions
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(interruption);
        self
    }

    pub fn with_comments(mut self, number: u64, logins: &[&str]) -> Self {
        self.comments
            .insert(number, logins.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_reviews(mut self, number: u64, logins: &[&str]) -> Self {
        self.reviews
            .insert(number, logins.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_commit_pages(mut self, pages: Vec<Vec<Option<&str>>>) -> Self {
        self.commit_pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(|l| l.map(str::to_string)).collect())
            .collect();
        self
    }

    pub fn with_profile(mut self, login: &str, reply: ProfileReply) -> Self {
        self.profiles.insert(login.to_string(), reply);
        self
    }

    pub fn with_rate_limited_profile(self, login: &str) -> Self {
        self.rate_limited_profiles
            .lock()
            .unwrap()
            .insert(login.to_string());
        self
    }

    pub fn with_quotas(self, quotas: Vec<Option<Quota>>) -> Self {
        self.quotas.lock().unwrap().extend(quotas);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn interruption(&self, page: u32) -> Option<Interruption> {
        self.interruptions
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(VecDeque::pop_front)
    }
}

fn interrupted<T>(interruption: Interruption) -> anyhow::Result<ApiResponse<T>> {
    match interruption {
        Interruption::RateLimited(retry_after) => Ok(ApiResponse::RateLimited { retry_after }),
        Interruption::Status(status) => Ok(ApiResponse::Failed(status)),
        Interruption::Malformed => Ok(ApiResponse::Malformed(
            "expected a JSON array: invalid type: map".to_string(),
        )),
        Interruption::Transport => Err(anyhow!("connection reset by peer")),
    }
}

fn account(login: &str) -> Option<Account> {
    Some(Account {
        login: Some(login.to_string()),
    })
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn quota(&self) -> anyhow::Result<Quota> {
        self.calls.lock().unwrap().quota += 1;
        match self.quotas.lock().unwrap().pop_front() {
            Some(Some(quota)) => Ok(quota),
            Some(None) => Err(anyhow!("quota endpoint unavailable")),
            None => Ok(Quota {
                limit: 5000,
                remaining: 5000,
                reset: 0,
            }),
        }
    }

    async fn list_items(
        &self,
        repo: &RepoId,
        _kind: ItemKind,
        page: u32,
    ) -> anyhow::Result<ApiResponse<Vec<RawItem>>> {
        self.calls
            .lock()
            .unwrap()
            .listing
            .push((repo.to_string(), page));
        if let Some(interruption) = self.interruption(page) {
            return interrupted(interruption);
        }
        let items = self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::Ok(items))
    }

    async fn participants(
        &self,
        _repo: &RepoId,
        thread: Thread,
        number: u64,
    ) -> anyhow::Result<ApiResponse<Vec<Participant>>> {
        self.calls.lock().unwrap().participants += 1;
        let source = match thread {
            Thread::Comments => &self.comments,
            Thread::Reviews => &self.reviews,
        };
        let entries = source
            .get(&number)
            .map(|logins| {
                logins
                    .iter()
                    .map(|login| Participant {
                        user: account(login),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ApiResponse::Ok(entries))
    }

    async fn list_commits(
        &self,
        _repo: &RepoId,
        _timeframe: &Timeframe,
        page: u32,
    ) -> anyhow::Result<ApiResponse<Vec<CommitSummary>>> {
        self.calls.lock().unwrap().commits.push(page);
        let commits = self
            .commit_pages
            .get(page as usize - 1)
            .map(|page| {
                page.iter()
                    .map(|login| CommitSummary {
                        author: login.as_deref().and_then(account),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ApiResponse::Ok(commits))
    }

    async fn user_profile(&self, login: &str) -> anyhow::Result<ApiResponse<UserProfile>> {
        self.calls.lock().unwrap().profiles.push(login.to_string());
        if self.rate_limited_profiles.lock().unwrap().remove(login) {
            return Ok(ApiResponse::RateLimited { retry_after: None });
        }
        match self.profiles.get(login) {
            Some(ProfileReply::Found(location)) => Ok(ApiResponse::Ok(UserProfile {
                location: location.map(str::to_string),
                email: None,
            })),
            Some(ProfileReply::Status(status)) => Ok(ApiResponse::Failed(*status)),
            Some(ProfileReply::Transport) => Err(anyhow!("operation timed out")),
            None => Ok(ApiResponse::Failed(StatusCode::NOT_FOUND)),
        }
    }
}

pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .unwrap()
        .with_timezone(&Utc)
}

/// A closed item opened by `author`; `resolved` sets both merge and close times.
pub fn item_by(number: u64, author: &str, created: &str, resolved: Option<&str>) -> RawItem {
    RawItem {
        number,
        title: format!("Item {number}"),
        user: account(author),
        created_at: at(created),
        closed_at: resolved.map(at),
        merged_at: resolved.map(at),
        pull_request: None,
    }
}

pub fn item(number: u64, created: &str, resolved: Option<&str>) -> RawItem {
    item_by(number, "someone", created, resolved)
}

pub fn study_window() -> Timeframe {
    Timeframe {
        label: "2018_2019".to_string(),
        since: at("2018-01-01T00:00:00Z"),
        until: at("2019-12-31T23:59:59Z"),
    }
}

pub fn unit(owner: &str, repo: &str) -> WorkUnit {
    WorkUnit {
        repo: RepoId::new(owner, repo),
        timeframe: study_window(),
    }
}

pub fn limiter() -> RateLimiter {
    RateLimiter::new(10, Duration::from_secs(10))
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        default_retry_after: Duration::from_secs(60),
        transport_delay: Duration::from_secs(5),
        max_transport_retries: 3,
    }
}

pub fn open_cache(dir: &Path) -> Arc<ContributionCache> {
    Arc::new(
        ContributionCache::open(
            dir.join("cached_prs.json"),
            dir.join("cached_pr_details.json"),
            10,
        )
        .unwrap(),
    )
}
