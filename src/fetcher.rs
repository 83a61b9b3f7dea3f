use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use log::{debug, warn};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::time::{sleep, Instant};
use url::Url;

use crate::decode;
use crate::limiter::TokenBucket;
use crate::retry::{AttemptResult, RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_WAIT_TIME};
use crate::uri::parse_url;
use crate::{ErrorKind, FetchError, FetchOutcome, Payload, Result};

/// Default average request rate, 10 requests per second
pub const DEFAULT_RATE: f64 = 10.0;
/// Default number of requests that may be sent back to back, 20
pub const DEFAULT_BURST: f64 = 20.0;
/// Default user agent, `ratefetch-<PKG_VERSION>`
pub const DEFAULT_USER_AGENT: &str = concat!("ratefetch/", env!("CARGO_PKG_VERSION"));

/// Fetches single URLs under a shared rate limit, retrying failed attempts
/// with exponential backoff.
///
/// Clones share the same [`TokenBucket`], so every clone counts against one
/// request budget.
#[derive(Debug, Clone)]
pub struct Fetcher {
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
    headers: HeaderMap,
    timeout: Option<Duration>,
    decode: bool,
    detailed_logs: bool,
}

/// A rate-limited fetcher.
///
/// Every setting is optional; see the `DEFAULT_*` constants for what an
/// unset field turns into.
#[derive(Builder, Debug)]
#[builder(build_fn(skip))]
#[builder(setter(into))]
#[builder(name = "FetcherBuilder")]
pub struct FetcherBuilderInternal {
    /// Average number of requests per second
    rate: f64,
    /// Maximum number of requests admitted back to back
    burst: f64,
    /// Attempts after the first one before a URL is given up
    retries: u32,
    /// Wait before the first retry. Doubles with every further retry.
    retry_wait_time: Duration,
    user_agent: String,
    /// Sent with every request, in addition to the user agent
    custom_headers: HeaderMap,
    /// Per-request timeout
    timeout: Option<Duration>,
    /// Decode bodies by content type. If disabled, bodies are returned as
    /// raw bytes.
    decode: bool,
    /// Log every retry with its attempt number
    detailed_logs: bool,
}

impl FetcherBuilder {
    /// Validates the settings and creates the fetcher along with its
    /// token bucket.
    ///
    /// # Errors
    ///
    /// Fails on an invalid rate or burst, a zero timeout and on a user agent
    /// that is not a valid header value.
    pub fn build(&mut self) -> Result<Fetcher> {
        let rate = self.rate.unwrap_or(DEFAULT_RATE);
        let burst = self.burst.unwrap_or(DEFAULT_BURST);
        let limiter = Arc::new(TokenBucket::new(rate, burst)?);

        let retry = RetryPolicy::new(
            self.retries.unwrap_or(DEFAULT_RETRIES),
            self.retry_wait_time.unwrap_or(DEFAULT_RETRY_WAIT_TIME),
        );

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);
        if let Some(custom) = &self.custom_headers {
            headers.extend(custom.clone());
        }

        let timeout = self.timeout.unwrap_or(None);
        if timeout == Some(Duration::from_secs(0)) {
            return Err(ErrorKind::InvalidTimeout);
        }

        Ok(Fetcher {
            limiter,
            retry,
            headers,
            timeout,
            decode: self.decode.unwrap_or(true),
            detailed_logs: self.detailed_logs.unwrap_or(false),
        })
    }
}

impl Fetcher {
    #[must_use]
    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Lower bound for the time it takes to fetch `urls` URLs, assuming
    /// every URL succeeds on its first attempt and the bucket starts full.
    #[must_use]
    pub fn estimate(&self, urls: usize) -> Duration {
        self.limiter.time_to_admit(urls)
    }

    /// Opens a session with its own connection pool.
    ///
    /// The pool is closed when the session is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BuildClient`] if the HTTP client cannot be
    /// created, e.g. because no TLS backend could be initialized.
    pub fn open(&self) -> Result<Session<'_>> {
        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .http1_only()
            .default_headers(self.headers.clone());

        let builder = match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };

        let client = builder.build().map_err(ErrorKind::BuildClient)?;
        debug!("Opened session");
        Ok(Session {
            client,
            fetcher: self,
        })
    }

    /// Fetches a single URL in a one-shot session.
    ///
    /// # Errors
    ///
    /// Fails if `url` is not a fetchable URL or the session cannot be
    /// opened. Failed requests are reported as [`FetchOutcome::Failure`].
    pub async fn fetch<T: AsRef<str>>(&self, url: T) -> Result<FetchOutcome> {
        let url = parse_url(url.as_ref())?;
        let session = self.open()?;
        session.fetch(&url).await
    }
}

/// Timing reference shared by all fetches of one batch
#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchContext {
    started: Instant,
}

impl BatchContext {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// An open connection pool, borrowed from a [`Fetcher`].
#[derive(Debug)]
pub struct Session<'a> {
    client: reqwest::Client,
    fetcher: &'a Fetcher,
}

impl Session<'_> {
    /// Fetches `url`, retrying failed attempts.
    ///
    /// # Errors
    ///
    /// Only fails if the rate limiter does. See
    /// [`TokenBucket::acquire`].
    pub async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        self.fetch_in(&BatchContext::new(), url).await
    }

    pub(crate) async fn fetch_in(&self, ctx: &BatchContext, url: &Url) -> Result<FetchOutcome> {
        let policy = self.fetcher.retry;
        let mut index = 0;
        loop {
            let attempt = policy.attempt(index);
            if attempt.backoff > Duration::from_secs(0) {
                sleep(attempt.backoff).await;
            }
            // Retries need a token just like the first attempt
            self.fetcher.limiter.acquire().await?;
            debug!(
                "[{:.3}s] GET {} (attempt {}/{})",
                ctx.elapsed().as_secs_f64(),
                url,
                attempt.count(),
                policy.max_attempts()
            );

            let result = self.send(url).await;
            match policy.classify(&attempt, result) {
                AttemptResult::Success(payload) => {
                    return Ok(FetchOutcome::Success {
                        payload,
                        attempts: attempt.count(),
                    })
                }
                AttemptResult::Retryable(e) => {
                    let next = policy.backoff(attempt.index + 1);
                    if self.fetcher.detailed_logs {
                        warn!(
                            "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                            attempt.count(),
                            policy.max_attempts(),
                            url,
                            e,
                            next
                        );
                    } else {
                        debug!("Retrying {} in {:?}: {}", url, next, e);
                    }
                    index += 1;
                }
                AttemptResult::Terminal(error) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        url,
                        attempt.count(),
                        error
                    );
                    return Ok(FetchOutcome::Failure {
                        error,
                        attempts: attempt.count(),
                    });
                }
            }
        }
    }

    /// A single GET request
    async fn send(&self, url: &Url) -> std::result::Result<Payload, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        if self.fetcher.decode {
            decode::decode(response).await
        } else {
            Ok(Payload::Bytes(response.bytes().await?.to_vec()))
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        debug!("Closed session");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decode::DecodeError;
    use crate::test_utils::{get_mock_server, get_mock_server_with_content, spawn_raw_server};
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retries() -> FetcherBuilder {
        let mut builder = FetcherBuilder::default();
        builder
            .rate(1000.0)
            .burst(1000.0)
            .retry_wait_time(Duration::from_millis(10));
        builder
    }

    #[tokio::test]
    async fn test_json_success() {
        let mock_server =
            get_mock_server_with_content(200, Some(("application/json", r#"{"key":"value"}"#)))
                .await;
        let outcome = fast_retries()
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                payload: Payload::Json(json!({"key": "value"})),
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_non_2xx_is_retried_until_exhausted() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&mock_server)
            .await;

        let outcome = fast_retries()
            .retries(2u32)
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                error: FetchError::Status(StatusCode::NOT_FOUND),
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn test_backoff_doubles() {
        let mock_server = get_mock_server(500).await;
        let fetcher = fast_retries()
            .retries(2u32)
            .retry_wait_time(Duration::from_millis(200))
            .build()
            .unwrap();

        let start = Instant::now();
        let outcome = fetcher.fetch(mock_server.uri()).await.unwrap();
        assert_eq!(outcome.attempts(), 3);
        // 200ms before the second attempt, 400ms before the third
        assert!(
            start.elapsed() >= Duration::from_millis(600),
            "took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
            .mount(&mock_server)
            .await;

        let outcome = fast_retries()
            .retries(2u32)
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                payload: Payload::Text("ok".to_string()),
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let outcome = fast_retries()
            .retries(0u32)
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                error: FetchError::Timeout,
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let outcome = fast_retries()
            .retries(1u32)
            .build()
            .unwrap()
            .fetch("http://127.0.0.1:1/")
            .await
            .unwrap();
        assert_eq!(outcome.attempts(), 2);
        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                error: FetchError::Network(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_decode_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("???", "application/weird"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = fast_retries()
            .retries(2u32)
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                error: FetchError::Decode(DecodeError::UnsupportedContentType(
                    "application/weird".to_string()
                )),
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_raw_mode() {
        let mock_server =
            get_mock_server_with_content(200, Some(("application/weird", "\u{1}raw"))).await;
        let outcome = fast_retries()
            .decode(false)
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert_eq!(
            outcome.into_result(),
            Ok(Payload::Bytes(b"\x01raw".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(header_matcher("user-agent", "integration-test"))
            .and(header_matcher("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("authorized", "text/plain"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut custom_headers = HeaderMap::new();
        custom_headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let outcome = fast_retries()
            .retries(0u32)
            .user_agent("integration-test")
            .custom_headers(custom_headers)
            .build()
            .unwrap()
            .fetch(mock_server.uri())
            .await
            .unwrap();
        assert!(outcome.is_success(), "{}", outcome);
    }

    #[tokio::test]
    async fn test_every_attempt_takes_a_token() {
        let mock_server = get_mock_server(503).await;
        let fetcher = FetcherBuilder::default()
            .rate(1.0)
            .burst(1.0)
            .retries(2u32)
            .retry_wait_time(Duration::from_millis(10))
            .build()
            .unwrap();

        let start = Instant::now();
        let outcome = fetcher.fetch(mock_server.uri()).await.unwrap();
        assert_eq!(outcome.attempts(), 3);
        // One token up front, then one per second for each retry
        assert!(
            start.elapsed() >= Duration::from_millis(1950),
            "took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_invalid_builder() {
        assert_eq!(
            FetcherBuilder::default().rate(0.0).build().unwrap_err(),
            ErrorKind::InvalidRate(0.0)
        );
        assert_eq!(
            FetcherBuilder::default().burst(-1.0).build().unwrap_err(),
            ErrorKind::InvalidBurst(-1.0)
        );
        assert!(matches!(
            FetcherBuilder::default().user_agent("bad\nagent").build(),
            Err(ErrorKind::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert_eq!(
            FetcherBuilder::default()
                .timeout(Duration::from_secs(0))
                .build()
                .unwrap_err(),
            ErrorKind::InvalidTimeout
        );
        assert!(FetcherBuilder::default()
            .timeout(Duration::from_millis(1))
            .build()
            .is_ok());
    }

    #[tokio::test]
    async fn test_truncated_body_is_retried() {
        // Announces 100 bytes, sends 3 and hangs up
        let server = spawn_raw_server(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 100\r\n\r\nabc",
            Duration::from_millis(0),
        )
        .await;

        for decode in &[true, false] {
            let outcome = fast_retries()
                .retries(2u32)
                .decode(*decode)
                .build()
                .unwrap()
                .fetch(&server.uri)
                .await
                .unwrap();
            assert_eq!(outcome.attempts(), 3, "{}", outcome);
            assert!(
                matches!(
                    outcome,
                    FetchOutcome::Failure {
                        error: FetchError::Network(_),
                        ..
                    }
                ),
                "{}",
                outcome
            );
        }
        assert_eq!(server.connections(), 6);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let fetcher = FetcherBuilder::default().build().unwrap();
        assert!(matches!(
            fetcher.fetch("ftp://example.com").await,
            Err(ErrorKind::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let fetcher = FetcherBuilder::default().build().unwrap();
        assert_eq!(fetcher.limiter().rate(), DEFAULT_RATE);
        assert_eq!(fetcher.limiter().burst(), DEFAULT_BURST);
        assert_eq!(fetcher.retry_policy(), RetryPolicy::default());
        assert_eq!(fetcher.estimate(20), Duration::from_secs(0));
        assert_eq!(fetcher.estimate(40), Duration::from_secs(2));
    }
}
