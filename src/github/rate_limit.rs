//! Primary rate-limit bookkeeping.

use chrono::{DateTime, Utc};
use core::time::Duration;
use reqwest::header::HeaderMap;
use serde::Deserialize;

/// The `rateLimit` descriptor GitHub embeds in GraphQL responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Budget ceiling for the current window
    #[serde(default)]
    pub limit: i64,

    /// Budget left in the current window
    pub remaining: i64,

    /// Cost of the request that produced this descriptor
    #[serde(default)]
    pub cost: i64,

    /// When the budget is replenished
    pub reset_at: DateTime<Utc>,
}

/// Implemented by every query response type to expose its embedded rate-limit descriptor.
pub trait RateLimited {
    fn rate_limit(&self) -> Option<RateLimit>;
}

/// Process-wide view of the primary rate limit, refreshed after every response.
#[derive(Debug, Clone, Default)]
pub struct RateLimitState {
    last: Option<RateLimit>,
}

impl RateLimitState {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// The most recently observed descriptor, if any response has carried one.
    #[must_use]
    pub const fn last(&self) -> Option<RateLimit> {
        self.last
    }

    pub fn update(&mut self, rate_limit: RateLimit) {
        self.last = Some(rate_limit);
    }

    /// Record that the server rejected a request for lack of budget.
    ///
    /// Returns `false` when no reset time is known, in which case the caller has
    /// nothing to wait for.
    pub fn mark_exhausted(&mut self) -> bool {
        match &mut self.last {
            Some(rate_limit) => {
                rate_limit.remaining = 0;
                true
            }
            None => false,
        }
    }

    /// How long to suspend before the next dispatch.
    ///
    /// Only an already-exhausted budget with a future reset time produces a wait, which
    /// covers the time until reset plus `buffer`.
    #[must_use]
    pub fn wait_before_dispatch(&self, now: DateTime<Utc>, buffer: Duration) -> Option<Duration> {
        let rate_limit = self.last?;
        if rate_limit.remaining > 0 || rate_limit.reset_at <= now {
            return None;
        }

        let until_reset = (rate_limit.reset_at - now).to_std().unwrap_or(Duration::ZERO);
        Some(until_reset + buffer)
    }
}

/// Extract rate limit information from HTTP response headers.
///
/// Used when a response carries no GraphQL `rateLimit` descriptor, for example an
/// HTTP-level rejection.
#[must_use]
pub fn from_headers(headers: &HeaderMap) -> Option<RateLimit> {
    let header = |name: &str| headers.get(name)?.to_str().ok()?.parse::<i64>().ok();

    let remaining = header("x-ratelimit-remaining")?;
    let reset_at = DateTime::from_timestamp(header("x-ratelimit-reset")?, 0)?;

    Some(RateLimit {
        limit: header("x-ratelimit-limit").unwrap_or_default(),
        remaining,
        cost: 0,
        reset_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn rate_limit(remaining: i64, reset_at: DateTime<Utc>) -> RateLimit {
        RateLimit {
            limit: 5000,
            remaining,
            cost: 1,
            reset_at,
        }
    }

    #[test]
    fn test_deserialize_graphql_descriptor() {
        let json = r#"{
            "limit": 5000,
            "remaining": 4321,
            "cost": 1,
            "resetAt": "2024-01-01T00:00:00Z"
        }"#;

        let rl: RateLimit = serde_json::from_str(json).unwrap();
        assert_eq!(rl.limit, 5000);
        assert_eq!(rl.remaining, 4321);
        assert_eq!(rl.cost, 1);
        assert_eq!(rl.reset_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_no_wait_without_observation() {
        let state = RateLimitState::new();
        assert!(state.wait_before_dispatch(Utc::now(), Duration::from_secs(3)).is_none());
    }

    #[test]
    fn test_no_wait_with_budget_left() {
        let now = Utc::now();
        let mut state = RateLimitState::new();
        state.update(rate_limit(1, now + chrono::Duration::minutes(5)));
        assert!(state.wait_before_dispatch(now, Duration::from_secs(3)).is_none());
    }

    #[test]
    fn test_no_wait_when_reset_passed() {
        let now = Utc::now();
        let mut state = RateLimitState::new();
        state.update(rate_limit(0, now - chrono::Duration::seconds(1)));
        assert!(state.wait_before_dispatch(now, Duration::from_secs(3)).is_none());
    }

    #[test]
    fn test_wait_until_reset_plus_buffer() {
        let now = Utc::now();
        let mut state = RateLimitState::new();
        state.update(rate_limit(0, now + chrono::Duration::seconds(30)));

        let wait = state.wait_before_dispatch(now, Duration::from_secs(3)).unwrap();
        assert_eq!(wait, Duration::from_secs(33));
    }

    #[test]
    fn test_negative_remaining_counts_as_exhausted() {
        let now = Utc::now();
        let mut state = RateLimitState::new();
        state.update(rate_limit(-2, now + chrono::Duration::seconds(10)));
        assert!(state.wait_before_dispatch(now, Duration::ZERO).is_some());
    }

    #[test]
    fn test_mark_exhausted() {
        let now = Utc::now();
        let mut state = RateLimitState::new();
        assert!(!state.mark_exhausted());

        state.update(rate_limit(100, now + chrono::Duration::seconds(10)));
        assert!(state.mark_exhausted());
        assert_eq!(state.last().unwrap().remaining, 0);
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));

        let rl = from_headers(&headers).unwrap();
        assert_eq!(rl.limit, 5000);
        assert_eq!(rl.remaining, 4999);
        assert_eq!(rl.reset_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_from_headers_missing() {
        assert!(from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_from_headers_invalid_remaining() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("invalid"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));
        assert!(from_headers(&headers).is_none());
    }
}
