//! Best-effort guard against exhausting the API quota.
//!
//! The check and the request that follows it are not atomic, so concurrent work units
//! can still overshoot the threshold slightly.

use crate::config::AppConfig;
use crate::github::{GitHubApi, Quota};
use chrono::Utc;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RateLimiter {
    threshold: u64,
    margin: Duration,
}

impl RateLimiter {
    pub const fn new(threshold: u64, margin: Duration) -> Self {
        Self { threshold, margin }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_threshold,
            Duration::from_secs(config.rate_limit_margin_seconds),
        )
    }

    /// Reads the current quota. Failures are logged and reported as an empty quota.
    pub async fn check_quota(&self, api: &dyn GitHubApi) -> Quota {
        match api.quota().await {
            Ok(quota) => {
                tracing::debug!(remaining = quota.remaining, "Rate limit remaining");
                quota
            }
            Err(e) => {
                tracing::warn!("Failed to check rate limit: {:#}", e);
                Quota::unknown()
            }
        }
    }

    /// Sleeps until the quota resets (plus margin) when it has nearly run out,
    /// then checks it once more.
    pub async fn await_quota(&self, api: &dyn GitHubApi) {
        let quota = self.check_quota(api).await;
        if quota.remaining >= self.threshold {
            return;
        }

        let wait = self.wait_for(quota.reset, Utc::now().timestamp());
        if wait.is_zero() {
            return;
        }

        tracing::warn!(
            remaining = quota.remaining,
            "Rate limit almost reached! Sleeping for {} seconds",
            wait.as_secs()
        );
        tokio::time::sleep(wait).await;
        self.check_quota(api).await;
    }

    /// Time left until `reset_epoch + margin`, clamped at zero.
    fn wait_for(&self, reset_epoch: i64, now_epoch: i64) -> Duration {
        let margin = i64::try_from(self.margin.as_secs()).unwrap_or(i64::MAX);
        let secs = reset_epoch.saturating_sub(now_epoch).saturating_add(margin);
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_adds_margin_to_reset() {
        let limiter = RateLimiter::new(10, Duration::from_secs(10));
        assert_eq!(limiter.wait_for(1_000, 950), Duration::from_secs(60));
    }

    #[test]
    fn test_wait_is_clamped_when_reset_is_long_past() {
        let limiter = RateLimiter::new(10, Duration::from_secs(10));
        assert_eq!(limiter.wait_for(0, 1_700_000_000), Duration::ZERO);
    }
}
