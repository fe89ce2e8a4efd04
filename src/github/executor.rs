//! Rate-limit-aware query execution
//!
//! The [`Executor`] runs one logical query at a time against a [`Transport`] and
//! absorbs both kinds of GitHub throttling:
//!
//! - **Primary limit**: before every dispatch, an exhausted budget whose reset time
//!   lies in the future suspends the caller until that reset plus a small buffer.
//!   A server-side primary rejection marks the budget exhausted and goes through
//!   the same wait.
//! - **Secondary limit**: a rejection whose text mentions a secondary rate limit
//!   sleeps for the current backoff, doubles the backoff up to a ceiling, and retries
//!   the same request. The backoff only ever grows for the life of the executor.
//!
//! Every other failure is returned to the caller untouched.
//!
//! The limiter state is locked for the whole read-decide-sleep-dispatch-update cycle,
//! so concurrent callers are serialized and budget accounting stays process-wide.

use super::queries::Query;
use super::rate_limit::{RateLimit, RateLimitState, RateLimited};
use super::transport::{GraphQlError, Reply, Transport, describe_errors};
use crate::Result;
use crate::cancel::CancelToken;
use crate::progress::RequestTracker;
use chrono::Utc;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "  executor";

/// Timing knobs for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Added to the primary reset time before dispatching again
    pub reset_buffer: Duration,

    /// First secondary-limit backoff
    pub secondary_backoff: Duration,

    /// Ceiling for the secondary-limit backoff
    pub max_secondary_backoff: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            reset_buffer: Duration::from_secs(3),
            secondary_backoff: Duration::from_secs(60),
            max_secondary_backoff: Duration::from_secs(600),
        }
    }
}

/// How a failed reply should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Burst throttling, retried after an exponential backoff
    SecondaryLimit,
    /// Request budget exhausted, retried after the reset time
    PrimaryLimit,
    /// Anything else, surfaced to the caller
    Other,
}

/// Classify the errors carried by a reply.
#[must_use]
pub fn classify(errors: &[GraphQlError]) -> ErrorClass {
    let mentions = |needle: &str| errors.iter().any(|e| e.message.to_ascii_lowercase().contains(needle));

    if mentions("secondary rate limit") {
        ErrorClass::SecondaryLimit
    } else if errors.iter().any(|e| e.kind.as_deref() == Some("RATE_LIMITED")) || mentions("api rate limit exceeded") {
        ErrorClass::PrimaryLimit
    } else {
        ErrorClass::Other
    }
}

#[derive(Debug)]
struct Limiter {
    state: RateLimitState,
    backoff: Duration,
}

/// Executes queries while honoring the primary and secondary rate limits.
#[derive(Debug)]
pub struct Executor<T> {
    transport: T,
    limiter: Mutex<Limiter>,
    settings: ExecutorSettings,
    cancel: CancelToken,
    tracker: Option<RequestTracker>,
}

impl<T: Transport> Executor<T> {
    #[must_use]
    pub fn new(transport: T, settings: ExecutorSettings, cancel: CancelToken) -> Self {
        Self {
            transport,
            limiter: Mutex::new(Limiter {
                state: RateLimitState::new(),
                backoff: settings.secondary_backoff,
            }),
            settings,
            cancel,
            tracker: None,
        }
    }

    /// Report waits through `tracker` in addition to the log.
    #[must_use]
    pub fn with_tracker(mut self, tracker: RequestTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The most recently observed primary rate limit.
    pub async fn rate_limit(&self) -> Option<RateLimit> {
        self.limiter.lock().await.state.last()
    }

    /// The delay the next secondary-limit rejection will wait for.
    pub async fn secondary_backoff(&self) -> Duration {
        self.limiter.lock().await.backoff
    }

    /// Execute `query`, waiting out rate limits, and return its decoded response.
    ///
    /// # Errors
    ///
    /// Returns transport failures, non-throttling GraphQL errors, undecodable
    /// responses, and cancellation.
    pub async fn execute<Q: Query>(&self, query: &Q) -> Result<Q::Response> {
        let request = query.request();
        let mut limiter = self.limiter.lock().await;

        loop {
            if let Some(wait) = limiter.state.wait_before_dispatch(Utc::now(), self.settings.reset_buffer) {
                self.notify(&format!(
                    "Rate limit reached, waiting {}s for the budget to reset",
                    wait.as_secs()
                ));
                self.sleep(wait).await?;
            }

            if self.cancel.is_cancelled() {
                return Err(app_err!("operation cancelled before requesting {}", query.describe()));
            }

            log::debug!(target: LOG_TARGET, "Requesting {}", query.describe());
            let reply = self.transport.send(&request).await?;
            let success = reply.is_success();
            let Reply {
                data,
                errors,
                header_rate_limit,
                ..
            } = reply;

            let decoded = data.map(serde_json::from_value::<Q::Response>);

            let body_rate_limit = match &decoded {
                Some(Ok(response)) => response.rate_limit(),
                _ => None,
            };
            if let Some(rate_limit) = body_rate_limit.or(header_rate_limit) {
                log::debug!(
                    target: LOG_TARGET,
                    "Rate limit: {}/{} remaining, last cost {}, resets at {}",
                    rate_limit.remaining,
                    rate_limit.limit,
                    rate_limit.cost,
                    rate_limit.reset_at
                );
                limiter.state.update(rate_limit);
            }

            if success && errors.is_empty() {
                return match decoded {
                    Some(response) => response.into_app_err_with(|| format!("decoding response for {}", query.describe())),
                    None => Err(describe_errors(&errors)),
                };
            }

            match classify(&errors) {
                ErrorClass::SecondaryLimit => self.back_off(&mut limiter).await?,
                ErrorClass::PrimaryLimit => {
                    let exhausted = limiter.state.mark_exhausted();
                    let must_wait = limiter
                        .state
                        .wait_before_dispatch(Utc::now(), self.settings.reset_buffer)
                        .is_some();

                    // Without a future reset time there is nothing to wait for, so fall back to backing off.
                    if !(exhausted && must_wait) {
                        self.back_off(&mut limiter).await?;
                    }
                }
                ErrorClass::Other => {
                    if Q::ACCEPTS_PARTIAL_DATA
                        && success
                        && let Some(Ok(response)) = decoded
                    {
                        for error in &errors {
                            log::debug!(target: LOG_TARGET, "Partial error in {}: {}", query.describe(), error.message);
                        }
                        return Ok(response);
                    }

                    return Err(describe_errors(&errors));
                }
            }
        }
    }

    async fn back_off(&self, limiter: &mut Limiter) -> Result<()> {
        let delay = limiter.backoff;
        self.notify(&format!("Secondary rate limit hit, waiting {}s before retrying", delay.as_secs()));
        self.sleep(delay).await?;
        limiter.backoff = delay.saturating_mul(2).min(self.settings.max_secondary_backoff);
        Ok(())
    }

    /// Sleep for `duration`, waking early with an error if the run is cancelled.
    async fn sleep(&self, duration: Duration) -> Result<()> {
        if let Some(tracker) = &self.tracker {
            tracker.set_waiting(true);
        }

        let result = tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.cancel.cancelled() => Err(app_err!("operation cancelled while waiting on a rate limit")),
        };

        if let Some(tracker) = &self.tracker {
            tracker.set_waiting(false);
        }

        result
    }

    fn notify(&self, message: &str) {
        log::warn!(target: LOG_TARGET, "{message}");
        if !log::log_enabled!(log::Level::Warn)
            && let Some(tracker) = &self.tracker
        {
            tracker.println(message);
        }
    }
}
