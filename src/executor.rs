use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use futures::TryFutureExt;
use log::info;

use crate::fetcher::{BatchContext, Fetcher};
use crate::uri::parse_urls;
use crate::{BatchResult, ErrorKind, Result};

/// Default number of fetches in flight, 10
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Runs the fetches of a batch side by side.
///
/// At most `concurrency_limit` URLs are in flight at any time. A URL holds
/// its slot for the whole fetch, including limiter waits, retries and
/// backoff. How fast requests actually go out is up to the fetcher's
/// token bucket, which is shared by all fetches of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchExecutor {
    concurrency_limit: usize,
    timeout: Option<Duration>,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            timeout: None,
        }
    }
}

impl BatchExecutor {
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConcurrency`] if `concurrency_limit` is 0.
    pub fn new(concurrency_limit: usize) -> Result<Self> {
        if concurrency_limit == 0 {
            return Err(ErrorKind::InvalidConcurrency(concurrency_limit));
        }
        Ok(Self {
            concurrency_limit,
            timeout: None,
        })
    }

    /// Abandons the whole batch if it is not done after `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Fetches every URL in `urls` with `fetcher` and partitions the
    /// outcomes into successes and failures, in input order.
    ///
    /// All URLs are validated before the first request is sent. A URL that
    /// cannot be fetched ends up in [`BatchResult::failures`] and does not
    /// affect the others.
    ///
    /// # Errors
    ///
    /// Fails before any network activity on an empty batch or a malformed
    /// URL. Fails without a partial result if the batch times out or the
    /// rate limiter runs into an internal error.
    pub async fn execute<I, S>(&self, fetcher: &Fetcher, urls: I) -> Result<BatchResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls = parse_urls(urls)?;
        info!(
            "Fetching {} URL(s), {} at a time (estimated {:?} or more)",
            urls.len(),
            self.concurrency_limit,
            fetcher.estimate(urls.len())
        );

        let session = fetcher.open()?;
        let ctx = BatchContext::new();
        // Completed fetches free their slot right away, whatever their
        // position in the input
        let fetches = {
            let (session, ctx) = (&session, &ctx);
            stream::iter(urls.iter().enumerate())
                .map(move |(index, url)| {
                    session
                        .fetch_in(ctx, url)
                        .map_ok(move |outcome| (index, outcome))
                })
                .buffer_unordered(self.concurrency_limit)
                .try_collect::<Vec<_>>()
        };

        let mut outcomes = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetches)
                .await
                .map_err(|_| ErrorKind::BatchTimeout(timeout))??,
            None => fetches.await?,
        };
        drop(session);

        outcomes.sort_unstable_by_key(|(index, _)| *index);
        let result: BatchResult = urls
            .into_iter()
            .zip(outcomes.into_iter().map(|(_, outcome)| outcome))
            .collect();
        info!(
            "Fetched {} URL(s) in {:.3}s: {} succeeded, {} failed",
            result.len(),
            ctx.elapsed().as_secs_f64(),
            result.successes.len(),
            result.failures.len()
        );
        Ok(result)
    }
}
