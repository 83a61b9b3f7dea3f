use std::time::Duration;
use thiserror::Error;

/// Errors which abort a fetch or a whole batch.
///
/// Per-URL network and decoding problems are never reported through this
/// type. They end up as [`crate::FetchError`] inside a
/// [`crate::FetchOutcome::Failure`] instead, so a single broken URL cannot
/// take down its siblings.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Token refill rate must be a finite number greater than zero
    #[error("Invalid rate `{0}`: must be a finite number of tokens per second greater than zero")]
    InvalidRate(f64),
    /// Bucket capacity must be finite and able to hold at least one token
    #[error("Invalid burst `{0}`: must be a finite capacity of at least one token")]
    InvalidBurst(f64),
    /// At least one fetch has to be allowed in flight
    #[error("Invalid concurrency limit `{0}`: must be at least 1")]
    InvalidConcurrency(usize),
    /// A zero request timeout would fail every request before it is sent
    #[error("Invalid timeout: must be longer than zero")]
    InvalidTimeout,
    /// A batch needs at least one URL
    #[error("Cannot execute an empty batch")]
    EmptyBatch,
    /// The given string can not be parsed into an absolute URL
    #[error("Cannot parse `{0}` as URL: {1}")]
    InvalidUrl(String, #[source] url::ParseError),
    /// Only `http` and `https` URLs with a host can be fetched
    #[error("Unsupported URL `{0}`: only http(s) URLs with a host can be fetched")]
    UnsupportedScheme(String),
    /// A custom header value could not be parsed
    #[error("Header could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// The underlying HTTP client could not be created
    #[error("Failed to build HTTP client")]
    BuildClient(#[source] reqwest::Error),
    /// The monotonic clock reported an instant before the last refill.
    /// This indicates a clock or logic bug and is never masked.
    #[error("Monotonic clock went backwards by {0:?} since the last refill")]
    ClockWentBackwards(Duration),
    /// The batch did not finish within its deadline.
    /// All in-flight fetches were abandoned.
    #[error("Batch cancelled after exceeding its timeout of {0:?}")]
    BatchTimeout(Duration),
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidRate(a), Self::InvalidRate(b))
            | (Self::InvalidBurst(a), Self::InvalidBurst(b)) => a.to_bits() == b.to_bits(),
            (Self::InvalidConcurrency(a), Self::InvalidConcurrency(b)) => a == b,
            (Self::InvalidUrl(s1, e1), Self::InvalidUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::UnsupportedScheme(s1), Self::UnsupportedScheme(s2)) => s1 == s2,
            (Self::ClockWentBackwards(d1), Self::ClockWentBackwards(d2))
            | (Self::BatchTimeout(d1), Self::BatchTimeout(d2)) => d1 == d2,
            (Self::EmptyBatch, Self::EmptyBatch)
            | (Self::InvalidTimeout, Self::InvalidTimeout)
            | (Self::InvalidHeader(_), Self::InvalidHeader(_)) => true,
            (Self::BuildClient(e1), Self::BuildClient(e2)) => e1.to_string() == e2.to_string(),
            _ => false,
        }
    }
}
