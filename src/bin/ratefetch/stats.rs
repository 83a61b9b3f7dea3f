use serde::Serialize;
use std::fmt::{self, Display};
use url::Url;

use ratefetch::{BatchResult, FetchError, Payload};

// Maximum padding for each entry in the final statistics output
const MAX_PADDING: usize = 20;

pub(crate) fn success_line(url: &Url, payload: &Payload) -> String {
    format!("✅ {} [{}]", url, payload.kind())
}

pub(crate) fn failure_line(url: &Url, error: &FetchError) -> String {
    let icon = match error {
        FetchError::Timeout => "⏳",
        FetchError::Status(_) => "🚫",
        FetchError::Decode(_) => "❓",
        FetchError::Network(_) => "⚡",
    };
    format!("{} {}: {}", icon, url, error)
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct BatchStats {
    total: usize,
    successful: usize,
    status_errors: usize,
    timeouts: usize,
    network_errors: usize,
    decode_errors: usize,
}

impl BatchStats {
    pub(crate) fn new(result: &BatchResult) -> Self {
        let mut stats = BatchStats {
            total: result.len(),
            successful: result.successes.len(),
            ..BatchStats::default()
        };
        for (_, error) in &result.failures {
            match error {
                FetchError::Status(_) => stats.status_errors += 1,
                FetchError::Timeout => stats.timeouts += 1,
                FetchError::Network(_) => stats.network_errors += 1,
                FetchError::Decode(_) => stats.decode_errors += 1,
            }
        }
        stats
    }

    pub(crate) fn is_success(&self) -> bool {
        self.total == self.successful
    }
}

fn write_stat(f: &mut fmt::Formatter, title: &str, stat: usize) -> fmt::Result {
    let fill = MAX_PADDING.saturating_sub(title.chars().count());
    writeln!(f, "{}{:.>fill$}", title, stat, fill = fill)
}

impl Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = "-".repeat(MAX_PADDING + 1);

        writeln!(f, "📝 Summary")?;
        writeln!(f, "{}", separator)?;
        write_stat(f, "🔍 Total", self.total)?;
        write_stat(f, "✅ Successful", self.successful)?;
        write_stat(f, "🚫 Rejected", self.status_errors)?;
        write_stat(f, "⏳ Timeouts", self.timeouts)?;
        write_stat(f, "⚡ Network", self.network_errors)?;
        write_stat(f, "❓ Undecodable", self.decode_errors)
    }
}

/// JSON report written by `--output`
#[derive(Serialize)]
pub(crate) struct Report<'a> {
    pub(crate) stats: &'a BatchStats,
    #[serde(flatten)]
    pub(crate) result: &'a BatchResult,
}
