use anyhow::{anyhow, Context, Result};
use log::LevelFilter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fs;
use std::time::Duration;
use structopt::StructOpt;

mod options;
mod stats;

use crate::options::{Config, RateFetchOptions};
use crate::stats::{failure_line, success_line, BatchStats, Report};

use ratefetch::{BatchExecutor, FetcherBuilder};

/// A C-like enum that can be cast to `i32` and used as process exit code.
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()` using the `?` operator.
    // This covers configuration errors as well as batches that were aborted as a whole.
    #[allow(unused)]
    UnexpectedFailure = 1,
    FetchFailure = 2,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be ran,
    // therefore we wrap "main" code in another function to guarantee that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

fn run_main() -> Result<i32> {
    let mut opts = RateFetchOptions::from_args();

    // Load a potentially existing config file and merge it into the config from the CLI
    if let Some(c) = Config::load_from_file(&opts.config_file)? {
        opts.config.merge(c)
    }
    init_logging(opts.config.verbose);

    let urls = opts.urls()?;
    let cfg = &opts.config;

    let runtime = match cfg.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    runtime.block_on(run(cfg, urls))
}

/// `RUST_LOG` takes precedence over `--verbose`
fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

async fn run(cfg: &Config, urls: Vec<String>) -> Result<i32> {
    let headers = parse_headers(&cfg.headers)?;

    let fetcher = FetcherBuilder::default()
        .rate(cfg.rate)
        .burst(cfg.burst)
        .retries(cfg.retries)
        .retry_wait_time(Duration::from_secs(cfg.retry_wait_time))
        .user_agent(cfg.user_agent.clone())
        .custom_headers(headers)
        .timeout(Duration::from_secs(cfg.timeout))
        .decode(!cfg.raw)
        .detailed_logs(cfg.verbose)
        .build()?;

    let mut executor = BatchExecutor::new(cfg.max_concurrency)?;
    if let Some(secs) = cfg.batch_timeout {
        executor = executor.with_timeout(Duration::from_secs(secs));
    }

    if cfg.verbose {
        println!(
            "Fetching {} URL(s), estimated to take at least {:.1}s",
            urls.len(),
            fetcher.estimate(urls.len()).as_secs_f64()
        );
    }

    let result = executor.execute(&fetcher, &urls).await?;

    for (url, payload) in &result.successes {
        println!("{}", success_line(url, payload));
    }
    for (url, error) in &result.failures {
        println!("{}", failure_line(url, error));
    }

    let stats = BatchStats::new(&result);
    if let Some(output) = &cfg.output {
        let report = serde_json::to_string_pretty(&Report {
            stats: &stats,
            result: &result,
        })?;
        fs::write(output, report).context("Cannot write report to file")?;
    }
    // separate summary from the list of URLs above
    println!();
    println!("{}", stats);

    match stats.is_success() {
        true => Ok(ExitCode::Success as i32),
        false => Ok(ExitCode::FetchFailure as i32),
    }
}

fn read_header(input: &str) -> Result<(String, String)> {
    let elements: Vec<_> = input.splitn(2, '=').collect();
    if elements.len() != 2 {
        return Err(anyhow!(
            "Header value should be of the form key=value, got {}",
            input
        ));
    }
    Ok((elements[0].into(), elements[1].into()))
}

fn parse_headers<T: AsRef<str>>(headers: &[T]) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for header in headers {
        let (key, val) = read_header(header.as_ref())?;
        out.insert(
            HeaderName::from_bytes(key.as_bytes())?,
            HeaderValue::from_str(&val)?,
        );
    }
    Ok(out)
}
