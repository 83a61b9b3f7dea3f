use std::fmt::Display;

use http::StatusCode;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::decode::DecodeError;

/// Decoded body of a successful response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Plain text or markup, passed through without parsing
    Text(String),
    /// Structured JSON value
    Json(serde_json::Value),
    /// Undecoded body, returned when decoding is switched off
    Bytes(Vec<u8>),
}

impl Payload {
    /// Short name of the payload variant, used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::Bytes(_) => "bytes",
        }
    }
}

/// Reason a single URL could not be fetched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status code
    #[error("Rejected with status code {0}")]
    Status(StatusCode),
    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Low-level error while connecting, sending or receiving
    #[error("Network error: {0}")]
    Network(String),
    /// The response arrived but its body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Every status and transport error is worth another try. A body that
    /// could not be decoded will not decode any better the second time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Decode(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Result of one logical fetch, after all retries
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A 2xx response was received and decoded
    Success {
        /// Decoded response body
        payload: Payload,
        /// Number of attempts it took, including the successful one
        attempts: u32,
    },
    /// Every allowed attempt failed, or the body could not be decoded
    Failure {
        /// The error of the last attempt
        error: FetchError,
        /// Number of attempts made
        attempts: u32,
    },
}

impl FetchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Success { attempts, .. } | FetchOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Drops the attempt count and turns the outcome into a plain `Result`
    pub fn into_result(self) -> Result<Payload, FetchError> {
        match self {
            FetchOutcome::Success { payload, .. } => Ok(payload),
            FetchOutcome::Failure { error, .. } => Err(error),
        }
    }
}

impl Display for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOutcome::Success { payload, attempts } => {
                write!(f, "OK ({}, {} attempt(s))", payload.kind(), attempts)
            }
            FetchOutcome::Failure { error, attempts } => {
                write!(f, "{} (after {} attempt(s))", error, attempts)
            }
        }
    }
}
