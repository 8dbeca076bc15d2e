use crate::domain::bar::{tail_truncate, CombinedTable};
use crate::ingest::provider::QuoteSource;
use crate::ingest::types::FetchError;
use std::time::Duration;

pub const DEFAULT_RECORDS_PER_TICKER: usize = 10;
pub const DEFAULT_REQUEST_DELAY_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Most recent trading days kept per ticker.
    pub records_per_ticker: usize,

    /// Fixed pause between consecutive tickers (provider rate limit).
    pub request_delay: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            records_per_ticker: DEFAULT_RECORDS_PER_TICKER,
            request_delay: Duration::from_secs(DEFAULT_REQUEST_DELAY_SECS),
        }
    }
}

impl CollectOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("COLLECT_RECORDS_PER_TICKER") {
            if let Ok(n) = s.parse::<usize>() {
                out.records_per_ticker = n;
            }
        }

        if let Ok(s) = std::env::var("COLLECT_REQUEST_DELAY_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.request_delay = Duration::from_secs(n);
            }
        }

        out
    }
}

/// Terminal state of one ticker's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerOutcome {
    Success { rows: usize },
    SoftFail,
    Malformed,
    HttpError { status: u16 },
    Exception,
}

impl TickerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<&FetchError> for TickerOutcome {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::RateLimitNotice { .. } => Self::SoftFail,
            FetchError::MalformedResponse { .. } => Self::Malformed,
            FetchError::HttpStatus { status, .. } => Self::HttpError { status: *status },
            FetchError::Unexpected { .. } => Self::Exception,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectRun {
    pub table: CombinedTable,
    pub outcomes: Vec<(String, TickerOutcome)>,
}

impl CollectRun {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_success()).count()
    }
}

/// Collect the most recent daily bars of every ticker in `watch_list`.
///
/// Never fails: a ticker whose fetch fails in any way is logged and skipped.
pub async fn collect<T: AsRef<str>>(
    source: &dyn QuoteSource,
    watch_list: &[T],
    opts: &CollectOptions,
) -> CombinedTable {
    collect_with_outcomes(source, watch_list, opts).await.table
}

pub async fn collect_with_outcomes<T: AsRef<str>>(
    source: &dyn QuoteSource,
    watch_list: &[T],
    opts: &CollectOptions,
) -> CollectRun {
    let mut run = CollectRun::default();
    let total = watch_list.len();

    for (idx, ticker) in watch_list.iter().enumerate() {
        let ticker = ticker.as_ref();
        if idx != 0 {
            tokio::time::sleep(opts.request_delay).await;
        }

        tracing::info!(
            idx,
            total,
            ticker,
            provider = source.provider_name(),
            "collecting ticker"
        );

        let outcome = match source.fetch_daily_series(ticker).await {
            Ok(series) => {
                let series = tail_truncate(series, opts.records_per_ticker);
                let rows = series.len();
                if rows == 0 {
                    tracing::warn!(ticker, "ticker returned no bars after truncation; nothing added");
                } else {
                    tracing::info!(ticker, rows, "ticker added");
                    run.table.append_series(series);
                }
                TickerOutcome::Success { rows }
            }
            Err(err) => {
                log_failure(&err);
                TickerOutcome::from(&err)
            }
        };

        run.outcomes.push((ticker.to_string(), outcome));
    }

    tracing::info!(
        tickers = total,
        rows = run.table.len(),
        failures = run.failures(),
        provider = source.provider_name(),
        "collection finished"
    );

    run
}

fn log_failure(err: &FetchError) {
    match err {
        FetchError::RateLimitNotice { ticker, message } => {
            tracing::warn!(%ticker, %message, "provider notice; skipping ticker");
        }
        FetchError::MalformedResponse { ticker, payload } => {
            tracing::warn!(%ticker, %payload, "response has no daily series; skipping ticker");
        }
        FetchError::HttpStatus { ticker, status, .. } => {
            tracing::error!(%ticker, status, error = %err, "HTTP error; skipping ticker");
        }
        FetchError::Unexpected { ticker, .. } => {
            tracing::error!(%ticker, error = %err, "unexpected failure; skipping ticker");
        }
    }
}
