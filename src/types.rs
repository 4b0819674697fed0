//! Domain types shared by the fetch pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A labelled study window. Both ends are inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timeframe {
    pub label: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Timeframe {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since <= at && at <= self.until
    }
}

/// One repository paired with one timeframe: the unit of caching and concurrency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub repo: RepoId,
    pub timeframe: Timeframe,
}

impl WorkUnit {
    /// Key under which the unit's rows live in the timeframe-level cache.
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.repo.owner, self.repo.repo, self.timeframe.label
        )
    }

    /// Every repository crossed with every timeframe, repository-major.
    pub fn cross_product(repos: &[RepoId], timeframes: &[Timeframe]) -> Vec<Self> {
        repos
            .iter()
            .flat_map(|repo| {
                timeframes.iter().map(move |timeframe| Self {
                    repo: repo.clone(),
                    timeframe: timeframe.clone(),
                })
            })
            .collect()
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.repo, self.timeframe.label)
    }
}

/// Which listing a pipeline walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    PullRequest,
    Issue,
}

impl ItemKind {
    pub const fn noun(self) -> &'static str {
        match self {
            Self::PullRequest => "PRs",
            Self::Issue => "issues",
        }
    }
}

/// Facts derived for a single pull request or issue.
///
/// Review fields are only present for pull requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub title: String,
    pub comment_count: usize,
    pub commented_by_target: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by_target: Option<bool>,
    /// Whole days between creation and merge (PRs) or close (issues).
    pub elapsed_days: i64,
}

/// One output row of a contribution pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRow {
    pub timeframe: String,
    pub repository: String,
    pub number: u64,
    pub author: String,
    pub opened_by_target: bool,
    #[serde(flatten)]
    pub detail: DetailRecord,
}

impl ContributionRow {
    /// Column headers of the output table for `kind`.
    pub fn headers(kind: ItemKind) -> &'static [&'static str] {
        match kind {
            ItemKind::PullRequest => &[
                "Time Frame",
                "Repository",
                "PR Number",
                "PR Title",
                "Author",
                "Opened by Swedish",
                "Total Comments",
                "Commented by Swedish",
                "Total Reviews",
                "Reviewed by Swedish",
                "Merge Time (Days)",
            ],
            ItemKind::Issue => &[
                "Time Frame",
                "Repository",
                "Issue Number",
                "Issue Title",
                "Author",
                "Opened by Swedish",
                "Total Comments",
                "Commented by Swedish",
                "Resolution Time (Days)",
            ],
        }
    }

    /// Renders the row in the column order of [`ContributionRow::headers`].
    pub fn to_record(&self, kind: ItemKind) -> Vec<String> {
        let mut record = vec![
            self.timeframe.clone(),
            self.repository.clone(),
            self.number.to_string(),
            self.detail.title.clone(),
            self.author.clone(),
            yes_no(self.opened_by_target).to_string(),
            self.detail.comment_count.to_string(),
            yes_no(self.detail.commented_by_target).to_string(),
        ];
        if kind == ItemKind::PullRequest {
            record.push(self.detail.review_count.unwrap_or(0).to_string());
            record.push(yes_no(self.detail.reviewed_by_target.unwrap_or(false)).to_string());
        }
        record.push(self.detail.elapsed_days.to_string());
        record
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

/// Whole days from `opened` to `resolved`, rounded towards negative infinity.
pub fn elapsed_days(opened: DateTime<Utc>, resolved: DateTime<Utc>) -> i64 {
    (resolved - opened).num_seconds().div_euclid(86_400)
}

/// Usernames classified as belonging to the tracked geography.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetSet {
    logins: HashSet<String>,
}

impl TargetSet {
    pub fn contains(&self, login: &str) -> bool {
        self.logins.contains(login)
    }

    /// True when any of `logins` is a target contributor.
    pub fn any<'a>(&self, logins: impl IntoIterator<Item = &'a String>) -> bool {
        logins.into_iter().any(|login| self.contains(login))
    }

    pub fn len(&self) -> usize {
        self.logins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logins.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TargetSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            logins: iter.into_iter().map(Into::into).collect(),
        }
    }
}
