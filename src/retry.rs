use std::time::Duration;

use crate::{FetchError, Payload};

/// Default number of retries after the first attempt, 2.
pub const DEFAULT_RETRIES: u32 = 2;
/// Default base wait before the first retry, 1 second.
pub const DEFAULT_RETRY_WAIT_TIME: Duration = Duration::from_secs(1);

/// How often and how patiently a failed request is repeated.
///
/// A request gets `retries + 1` attempts. Attempt `n` (0-based) is preceded
/// by a backoff of `base_wait * 2^(n - 1)`, so the first attempt starts
/// right away and the defaults wait 1s, 2s, 4s, ... between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    base_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_RETRY_WAIT_TIME)
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u32, base_wait: Duration) -> Self {
        Self { retries, base_wait }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait before attempt `index`
    #[must_use]
    pub fn backoff(&self, index: u32) -> Duration {
        if index == 0 {
            return Duration::from_secs(0);
        }
        2u32.checked_pow(index - 1)
            .and_then(|factor| self.base_wait.checked_mul(factor))
            .unwrap_or_else(|| Duration::from_secs(u64::MAX))
    }

    /// Attempt `index` with the backoff that precedes it
    pub(crate) fn attempt(&self, index: u32) -> Attempt {
        Attempt {
            index,
            backoff: self.backoff(index),
        }
    }

    /// Decides what the result of `attempt` means for the retry loop
    pub(crate) fn classify(
        &self,
        attempt: &Attempt,
        result: Result<Payload, FetchError>,
    ) -> AttemptResult {
        match result {
            Ok(payload) => AttemptResult::Success(payload),
            Err(e) if e.is_retryable() && attempt.index < self.retries => {
                AttemptResult::Retryable(e)
            }
            Err(e) => AttemptResult::Terminal(e),
        }
    }
}

/// One try of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attempt {
    /// 0-based attempt index
    pub(crate) index: u32,
    /// Time to wait before this attempt may acquire a token
    pub(crate) backoff: Duration,
}

impl Attempt {
    /// Number of attempts made once this one has finished
    pub(crate) const fn count(&self) -> u32 {
        self.index + 1
    }
}

#[derive(Debug)]
pub(crate) enum AttemptResult {
    Success(Payload),
    Retryable(FetchError),
    Terminal(FetchError),
}
