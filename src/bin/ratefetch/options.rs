use anyhow::{Context, Error, Result};
use lazy_static::lazy_static;
use ratefetch::{
    DEFAULT_BURST, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_RATE, DEFAULT_RETRIES, DEFAULT_USER_AGENT,
};
use serde::Deserialize;
use std::{fs, io::ErrorKind, path::PathBuf};
use structopt::StructOpt;

const RETRY_WAIT_TIME: u64 = 1;
const TIMEOUT: u64 = 20;

// this exists because structopt requires `&str` type values for defaults
// (we can't use e.g. `TIMEOUT` or `timeout()` which gets created for serde)
lazy_static! {
    static ref RATE_STR: String = DEFAULT_RATE.to_string();
    static ref BURST_STR: String = DEFAULT_BURST.to_string();
    static ref RETRIES_STR: String = DEFAULT_RETRIES.to_string();
    static ref RETRY_WAIT_TIME_STR: String = RETRY_WAIT_TIME.to_string();
    static ref MAX_CONCURRENCY_STR: String = DEFAULT_CONCURRENCY_LIMIT.to_string();
    static ref TIMEOUT_STR: String = TIMEOUT.to_string();
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    rate: f64 = DEFAULT_RATE;
    burst: f64 = DEFAULT_BURST;
    retries: u32 = DEFAULT_RETRIES;
    retry_wait_time: u64 = RETRY_WAIT_TIME;
    max_concurrency: usize = DEFAULT_CONCURRENCY_LIMIT;
    timeout: u64 = TIMEOUT;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ( $cli:ident , $toml:ident ; $( $key:ident : $default:expr; )* ) => {
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ratefetch",
    about = "Fetch a batch of URLs without breaking the rate limit of the API behind them."
)]
pub(crate) struct RateFetchOptions {
    /// The URLs to fetch.
    /// Prefix with `--` to separate URLs from options that allow multiple arguments.
    #[structopt(name = "urls")]
    raw_urls: Vec<String>,

    /// Configuration file to use
    #[structopt(short, long = "config", default_value = "./ratefetch.toml")]
    pub config_file: String,

    #[structopt(flatten)]
    pub config: Config,
}

impl RateFetchOptions {
    /// All URLs to fetch: the ones given on the command line, followed by
    /// the ones read from the input file.
    pub(crate) fn urls(&self) -> Result<Vec<String>> {
        let mut urls = self.raw_urls.clone();
        if let Some(path) = &self.config.input_file {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Cannot read input file {}", path.display()))?;
            urls.extend(read_urls(&contents));
        }
        Ok(urls)
    }
}

/// One URL per line. Blank lines and lines starting with `#` are skipped.
fn read_urls(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
}

#[derive(Debug, Deserialize, StructOpt)]
pub struct Config {
    /// Verbose program output.
    /// Logs every retry and the expected duration of the batch.
    #[structopt(short, long)]
    #[serde(default)]
    pub verbose: bool,

    /// Average number of requests per second
    #[structopt(short, long, default_value = &RATE_STR)]
    #[serde(default = "rate")]
    pub rate: f64,

    /// Maximum number of requests sent back to back
    #[structopt(short, long, default_value = &BURST_STR)]
    #[serde(default = "burst")]
    pub burst: f64,

    /// Number of retries after a failed request
    #[structopt(short = "R", long, default_value = &RETRIES_STR)]
    #[serde(default = "retries")]
    pub retries: u32,

    /// Seconds to wait before the first retry. Doubles with every further retry.
    #[structopt(long, default_value = &RETRY_WAIT_TIME_STR)]
    #[serde(default = "retry_wait_time")]
    pub retry_wait_time: u64,

    /// Maximum number of concurrent fetches
    #[structopt(long, default_value = &MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub max_concurrency: usize,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[structopt(short = "T", long)]
    #[serde(default)]
    pub threads: Option<usize>,

    /// User agent
    #[structopt(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub user_agent: String,

    /// Custom request headers, e.g. `authorization=Bearer token`
    #[structopt(short = "H", long)]
    #[serde(default)]
    pub headers: Vec<String>,

    /// Seconds a single request may take from connect to response finished
    #[structopt(short, long, default_value = &TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub timeout: u64,

    /// Seconds the whole batch may take before it is cancelled
    #[structopt(long)]
    #[serde(default)]
    pub batch_timeout: Option<u64>,

    /// Return bodies as raw bytes instead of decoding them by content type
    #[structopt(long)]
    #[serde(default)]
    pub raw: bool,

    /// File with additional URLs to fetch, one per line
    #[structopt(short, long, parse(from_os_str))]
    #[serde(default)]
    pub input_file: Option<PathBuf>,

    /// Output file for the JSON report
    #[structopt(short, long, parse(from_os_str))]
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &str) -> Result<Option<Config>> {
        // Read configuration file
        let result = fs::read(path);

        // Ignore a file not found error
        let contents = match result {
            Ok(c) => c,
            Err(e) => {
                return match e.kind() {
                    ErrorKind::NotFound => Ok(None),
                    _ => Err(Error::from(e)),
                }
            }
        };

        Ok(Some(toml::from_slice(&contents)?))
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        fold_in! {
            // Destination and source configs
            self, toml;

            // Keys with defaults to assign
            verbose: false;
            rate: DEFAULT_RATE;
            burst: DEFAULT_BURST;
            retries: DEFAULT_RETRIES;
            retry_wait_time: RETRY_WAIT_TIME;
            max_concurrency: DEFAULT_CONCURRENCY_LIMIT;
            threads: None;
            user_agent: DEFAULT_USER_AGENT;
            headers: Vec::<String>::new();
            timeout: TIMEOUT;
            batch_timeout: None;
            raw: false;
            input_file: None;
            output: None;
        }
    }
}
