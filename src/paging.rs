//! Single-page requests with rate limit waits and transport retries.

use crate::config::AppConfig;
use crate::github::{ApiResponse, GitHubApi};
use crate::rate_limit::RateLimiter;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

const MAX_TRANSPORT_DELAY: Duration = Duration::from_secs(300);

/// How long to wait between attempts at the same page.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Wait after a rate-limited response without a Retry-After header.
    pub default_retry_after: Duration,
    /// First transport retry delay; doubled on every further failure.
    pub transport_delay: Duration,
    /// Consecutive transport failures tolerated before the page is abandoned.
    pub max_transport_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_retry_after: Duration::from_secs(config.default_retry_after_seconds),
            transport_delay: Duration::from_secs(config.transport_retry_delay_seconds),
            max_transport_retries: config.transport_max_retries,
        }
    }

    pub fn rate_limit_wait(&self, retry_after: Option<u64>) -> Duration {
        retry_after.map_or(self.default_retry_after, Duration::from_secs)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn transport_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.transport_delay
            .saturating_mul(factor)
            .min(MAX_TRANSPORT_DELAY)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageOutcome<T> {
    Items(Vec<T>),
    /// The listing cannot be continued; whatever was gathered so far stands.
    Stop,
}

/// Requests one page until it succeeds or fails permanently.
///
/// Every attempt is preceded by a quota check. Rate-limited responses wait and repeat
/// the same page without limit; transport failures back off and give up after
/// `max_transport_retries`; any other failure status, or a body that is not a JSON
/// array, stops at once.
pub async fn request_page<T, F, Fut>(
    api: &dyn GitHubApi,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    what: &str,
    mut send: F,
) -> PageOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ApiResponse<Vec<T>>>>,
{
    let mut failures = 0;
    loop {
        limiter.await_quota(api).await;

        match send().await {
            Ok(ApiResponse::Ok(items)) => return PageOutcome::Items(items),
            Ok(ApiResponse::RateLimited { retry_after }) => {
                let wait = policy.rate_limit_wait(retry_after);
                tracing::warn!("Rate limited on {}! Waiting for {} seconds...", what, wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Ok(ApiResponse::Failed(status)) => {
                tracing::error!(%status, "Failed to fetch {}", what);
                return PageOutcome::Stop;
            }
            Ok(ApiResponse::Malformed(reason)) => {
                tracing::error!("Failed to decode {}: {}", what, reason);
                return PageOutcome::Stop;
            }
            Err(e) => {
                if failures >= policy.max_transport_retries {
                    tracing::error!("Giving up on {} after {} retries: {:#}", what, failures, e);
                    return PageOutcome::Stop;
                }
                let delay = policy.transport_backoff(failures);
                failures += 1;
                tracing::warn!(
                    "Error fetching {}: {:#}; retrying in {} seconds",
                    what,
                    e,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
