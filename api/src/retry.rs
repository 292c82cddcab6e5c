use std::thread::sleep;
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for retrying calls which fail for transient reasons.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts for a single logical call.
    pub max_retry_count: u32,
    /// Amount of time to wait after a timeout or connection failure. When unset the wait is
    /// `2 * max_retry_count` seconds.
    pub connection_wait: Option<Duration>,
    /// Amount of time to wait when the API reports `RATE_EXCEEDED`.
    pub rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 10,
            connection_wait: None,
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// Configuration for the long running report and segment upload jobs.
#[derive(Clone, Debug, PartialEq)]
pub struct PollingConfig {
    /// Time between two status checks.
    pub interval: Duration,
    /// Maximum number of report status checks before giving up (~15 min by default, which is
    /// how long the API may take to compute a report).
    pub max_report_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_report_polls: 500,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Backoff {
    /// Retry straight away, e.g. after renewing the session.
    Immediate,
    Connection,
    RateLimit,
}

pub(crate) enum Attempt<T> {
    Done(T),
    Retry { reason: String, backoff: Backoff },
}

#[derive(Debug)]
pub(crate) struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retry_count(&self) -> u32 {
        self.config.max_retry_count
    }

    fn wait_for(&self, backoff: Backoff, max_retry_count: u32) -> Duration {
        match backoff {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Connection => self
                .config
                .connection_wait
                .unwrap_or_else(|| Duration::from_secs(2 * u64::from(max_retry_count))),
            Backoff::RateLimit => self.config.rate_limit_wait,
        }
    }

    /// Run `attempt` until it is done, fails, or the retry budget is exhausted.
    ///
    /// `attempt` is given the 1-based index of the current attempt. Errors returned by `attempt`
    /// are terminal and propagated as is.
    pub fn with_retries<T>(
        &self,
        max_retry_count: Option<u32>,
        mut attempt: impl FnMut(u32) -> Result<Attempt<T>>,
    ) -> Result<T> {
        let max_retry_count = max_retry_count.unwrap_or(self.config.max_retry_count);

        for i_attempt in 1..=max_retry_count {
            match attempt(i_attempt)? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry { reason, backoff } if i_attempt < max_retry_count => {
                    let duration = self.wait_for(backoff, max_retry_count);
                    if backoff == Backoff::Immediate {
                        log::info!("{reason} - retrying ({i_attempt}/{max_retry_count}).");
                    } else {
                        log::warn!(
                            "{reason} - retrying after {duration:?} ({i_attempt}/{max_retry_count})."
                        );
                        sleep(duration);
                    }
                }
                Attempt::Retry { reason, .. } => {
                    log::warn!("{reason} - giving up after {max_retry_count} attempts.");
                }
            }
        }

        Err(Error::TooManyRequests {
            attempts: max_retry_count,
        })
    }
}
