//! Token bucket admission control.
//!
//! The bucket starts full with `burst` tokens and refills continuously at
//! `rate` tokens per second, never holding more than `burst`. Each admission
//! takes one token. Tasks that find the bucket empty sleep until the next
//! token is due instead of polling on a fixed interval.
use std::time::Duration;

use log::trace;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{ErrorKind, Result};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    /// Adds the tokens accumulated since the last refill, capped at `burst`.
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) -> Result<()> {
        let elapsed = now
            .checked_duration_since(self.last_refill)
            .ok_or_else(|| ErrorKind::ClockWentBackwards(self.last_refill.duration_since(now)))?;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(burst);
        self.last_refill = now;
        Ok(())
    }
}

/// Rate limiter shared by all fetches of a batch.
///
/// The check-and-decrement of [`TokenBucket::acquire`] happens under a
/// single lock, so two tasks can never both take the last token.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket admitting `rate` requests per second on average
    /// and at most `burst` requests back to back.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRate`] unless `rate` is finite and
    /// positive, and [`ErrorKind::InvalidBurst`] unless `burst` is finite and
    /// at least one (a smaller bucket could never admit anything).
    pub fn new(rate: f64, burst: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ErrorKind::InvalidRate(rate));
        }
        if !burst.is_finite() || burst < 1.0 {
            return Err(ErrorKind::InvalidBurst(burst));
        }
        Ok(TokenBucket {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[must_use]
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Waits until a token is available and takes it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::ClockWentBackwards`] if the monotonic clock
    /// reports an instant before the previous refill.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            match self.try_acquire().await? {
                None => return Ok(()),
                Some(wait) => {
                    trace!("Bucket empty, next token in {:?}", wait);
                    sleep(wait).await;
                }
            }
        }
    }

    /// Takes a token if one is available. Otherwise returns how long it will
    /// take until the next one is due.
    async fn try_acquire(&self) -> Result<Option<Duration>> {
        let mut state = self.state.lock().await;
        // Read the clock only once the lock is held. An instant taken before
        // waiting on the lock may predate the refill of whoever held it.
        state.refill(Instant::now(), self.rate, self.burst)?;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(None);
        }
        Ok(Some(Duration::from_secs_f64(
            (1.0 - state.tokens) / self.rate,
        )))
    }

    /// Current token balance, after accounting for the time since the last
    /// refill.
    ///
    /// # Errors
    ///
    /// Same as [`TokenBucket::acquire`].
    pub async fn available(&self) -> Result<f64> {
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.rate, self.burst)?;
        Ok(state.tokens)
    }

    /// Minimum time a full bucket needs to admit `requests` requests.
    ///
    /// The first `burst` requests pass immediately, the rest at `rate`.
    #[must_use]
    pub fn time_to_admit(&self, requests: usize) -> Duration {
        let excess = requests as f64 - self.burst.floor();
        if excess <= 0.0 {
            Duration::from_secs(0)
        } else {
            Duration::from_secs_f64(excess / self.rate)
        }
    }
}
