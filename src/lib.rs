//! `ratefetch` is a library for fetching batches of URLs from rate-limited
//! APIs.
//! The main structs of this crate are `FetcherBuilder`, which configures the
//! request budget and retry behavior, and `BatchExecutor`, which runs a whole
//! batch of URLs through a fetcher.
//!
//! "Hello world" example:
//! ```no_run
//!
//! use ratefetch::{BatchExecutor, FetcherBuilder};
//! use std::error::Error;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!   let fetcher = FetcherBuilder::default().rate(5.0).burst(5.0).build()?;
//!   let urls = vec![
//!       "https://api.example.com/v1/items/1",
//!       "https://api.example.com/v1/items/2",
//!   ];
//!   let result = BatchExecutor::default().execute(&fetcher, urls).await?;
//!   for (url, payload) in &result.successes {
//!       println!("{}: {}", url, payload.kind());
//!   }
//!   Ok(())
//! }
//! ```

mod executor;
mod fetcher;
mod limiter;
mod retry;
mod types;
mod uri;

pub mod decode;
#[cfg(test)]
pub(crate) mod test_utils;

pub use executor::{BatchExecutor, DEFAULT_CONCURRENCY_LIMIT};
pub use fetcher::{
    Fetcher, FetcherBuilder, Session, DEFAULT_BURST, DEFAULT_RATE, DEFAULT_USER_AGENT,
};
pub use limiter::TokenBucket;
pub use retry::{RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_WAIT_TIME};
pub use types::*;
pub use uri::{parse_url, parse_urls};
