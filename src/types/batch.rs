use serde::Serialize;
use std::iter::FromIterator;
use url::Url;

use crate::{FetchError, FetchOutcome, Payload};

/// Outcome of a whole batch, partitioned by success.
///
/// Every input URL occupies exactly one entry in either `successes` or
/// `failures`. Both sequences keep the relative order of the input, and
/// every payload or error is paired with the URL that produced it.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    /// URLs that returned a 2xx response, with their decoded payloads
    pub successes: Vec<(Url, Payload)>,
    /// URLs that never succeeded, with the last error seen
    pub failures: Vec<(Url, FetchError)>,
}

impl BatchResult {
    /// Total number of URLs accounted for
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when no URL failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterates over all URLs of the batch, successes first
    pub fn urls(&self) -> impl Iterator<Item = &Url> {
        self.successes
            .iter()
            .map(|(url, _)| url)
            .chain(self.failures.iter().map(|(url, _)| url))
    }
}

impl FromIterator<(Url, FetchOutcome)> for BatchResult {
    fn from_iter<T: IntoIterator<Item = (Url, FetchOutcome)>>(iter: T) -> Self {
        let mut result = BatchResult::default();
        for (url, outcome) in iter {
            match outcome.into_result() {
                Ok(payload) => result.successes.push((url, payload)),
                Err(error) => result.failures.push((url, error)),
            }
        }
        result
    }
}
