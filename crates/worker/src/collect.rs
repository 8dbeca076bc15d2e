use pregao_core::config::Settings;
use pregao_core::ingest::alpha_vantage::AlphaVantageClient;
use pregao_core::ingest::collector::{self, CollectOptions};
use pregao_core::ingest::DEFAULT_WATCH_LIST;
use pregao_core::storage::csv_table::{self, WriteOutcome};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, clap::Args)]
pub struct CollectArgs {
    /// Comma-separated B3 tickers (without the .SA suffix). Defaults to the built-in watch-list.
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Most recent trading days kept per ticker.
    #[arg(long)]
    records: Option<usize>,

    /// Pause between tickers, in seconds.
    #[arg(long)]
    request_delay_secs: Option<u64>,

    /// Pause before the single retry after an HTTP 503, in seconds.
    #[arg(long)]
    retry_delay_secs: Option<u64>,

    /// Destination CSV (overwritten).
    #[arg(long, default_value = csv_table::DEFAULT_OUTPUT_PATH)]
    output: PathBuf,
}

impl CollectArgs {
    fn options(&self) -> CollectOptions {
        let mut opts = CollectOptions::from_env();
        if let Some(n) = self.records {
            opts.records_per_ticker = n;
        }
        if let Some(s) = self.request_delay_secs {
            opts.request_delay = Duration::from_secs(s);
        }
        opts
    }

    fn watch_list(&self) -> Vec<String> {
        let tickers: Vec<String> = self
            .tickers
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tickers.is_empty() {
            DEFAULT_WATCH_LIST.iter().map(|t| t.to_string()).collect()
        } else {
            tickers
        }
    }
}

pub async fn run(settings: &Settings, args: CollectArgs) -> anyhow::Result<()> {
    let mut source = AlphaVantageClient::from_settings(settings)?;
    if let Some(s) = args.retry_delay_secs {
        source = source.with_retry_delay(Duration::from_secs(s));
    }

    let opts = args.options();
    let watch_list = args.watch_list();
    tracing::info!(
        tickers = watch_list.len(),
        records_per_ticker = opts.records_per_ticker,
        request_delay = ?opts.request_delay,
        output = %args.output.display(),
        "collect run starting"
    );

    let table = collector::collect(&source, &watch_list, &opts).await;

    match csv_table::write_combined_table(&table, &args.output)? {
        WriteOutcome::Written { rows } => {
            tracing::info!(rows, path = %args.output.display(), "file saved");
        }
        WriteOutcome::Skipped => {
            tracing::warn!("no data was collected; CSV not written");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        collect: CollectArgs,
    }

    fn parse(args: &[&str]) -> CollectArgs {
        Cli::try_parse_from(std::iter::once("collect").chain(args.iter().copied()))
            .unwrap()
            .collect
    }

    #[test]
    fn normalizes_tickers_from_flag() {
        let args = parse(&["--tickers", " petr4 ,vale3,,"]);
        assert_eq!(args.watch_list(), vec!["PETR4", "VALE3"]);
    }

    #[test]
    fn blank_ticker_flag_falls_back_to_default_watch_list() {
        let defaults: Vec<String> = DEFAULT_WATCH_LIST.iter().map(|t| t.to_string()).collect();
        assert_eq!(parse(&[]).watch_list(), defaults);
        assert_eq!(parse(&["--tickers", " , "]).watch_list(), defaults);
    }

    #[test]
    fn output_defaults_to_data_dir() {
        assert_eq!(parse(&[]).output, PathBuf::from(csv_table::DEFAULT_OUTPUT_PATH));
    }

    // Only test in this crate that touches the process environment.
    #[test]
    fn flags_take_precedence_over_env() {
        std::env::set_var("COLLECT_RECORDS_PER_TICKER", "7");
        std::env::set_var("COLLECT_REQUEST_DELAY_SECS", "9");

        let from_env = parse(&[]).options();
        let from_flags = parse(&["--records", "3", "--request-delay-secs", "0"]).options();

        std::env::remove_var("COLLECT_RECORDS_PER_TICKER");
        std::env::remove_var("COLLECT_REQUEST_DELAY_SECS");

        assert_eq!(from_env.records_per_ticker, 7);
        assert_eq!(from_env.request_delay, Duration::from_secs(9));
        assert_eq!(from_flags.records_per_ticker, 3);
        assert_eq!(from_flags.request_delay, Duration::ZERO);
    }
}
