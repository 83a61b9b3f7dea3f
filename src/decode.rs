//! Content-type driven decoding of response bodies.
use std::fmt::Display;
use std::str::FromStr;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use thiserror::Error;

use crate::{FetchError, Payload};

/// Reason a successful response could not be turned into a [`Payload`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The response did not declare a content type
    #[error("Response has no Content-Type header")]
    MissingContentType,
    /// The declared content type has no decoder
    #[error("No decoder available for content type `{0}`")]
    UnsupportedContentType(String),
    /// The body was declared as JSON but did not parse
    #[error("Invalid JSON body: {0}")]
    Json(String),
}

/// The content types a response can be decoded from.
///
/// Markup is passed through as text and never parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// `application/json`
    Json,
    /// `text/plain`
    PlainText,
    /// `text/html`
    Html,
    /// `application/xml`
    Xml,
}

impl ContentKind {
    /// Determines the content kind from the `Content-Type` header
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, DecodeError> {
        let value = headers
            .get(CONTENT_TYPE)
            .ok_or(DecodeError::MissingContentType)?;
        String::from_utf8_lossy(value.as_bytes()).parse()
    }

    /// Decodes a body that was declared with this content kind
    pub fn decode(self, body: String) -> Result<Payload, DecodeError> {
        match self {
            ContentKind::Json => serde_json::from_str(&body)
                .map(Payload::Json)
                .map_err(|e| DecodeError::Json(e.to_string())),
            ContentKind::PlainText | ContentKind::Html | ContentKind::Xml => {
                Ok(Payload::Text(body))
            }
        }
    }
}

impl FromStr for ContentKind {
    type Err = DecodeError;

    /// Parses a `Content-Type` value. Parameters such as `charset` are
    /// ignored and the media type is compared case-insensitively.
    fn from_str(content_type: &str) -> Result<Self, Self::Err> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Ok(ContentKind::Json),
            "text/plain" => Ok(ContentKind::PlainText),
            "text/html" => Ok(ContentKind::Html),
            "application/xml" => Ok(ContentKind::Xml),
            "" => Err(DecodeError::MissingContentType),
            _ => Err(DecodeError::UnsupportedContentType(essence)),
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mime = match self {
            ContentKind::Json => "application/json",
            ContentKind::PlainText => "text/plain",
            ContentKind::Html => "text/html",
            ContentKind::Xml => "application/xml",
        };
        write!(f, "{}", mime)
    }
}

/// Reads the body of `response` and decodes it according to its declared
/// content type.
///
/// The content type is checked before the body is read, so an unexpected
/// response is rejected without downloading it. A body that breaks off while
/// it is read is a transport error, not a decode error.
pub async fn decode(response: reqwest::Response) -> Result<Payload, FetchError> {
    let kind = ContentKind::from_headers(response.headers())?;
    let body = response.text().await?;
    Ok(kind.decode(body)?)
}
