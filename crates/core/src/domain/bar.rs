use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Union of every collected per-ticker series.
///
/// Rows keep the order they were appended in: watch-list order between
/// tickers, ascending date within each ticker's block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedTable {
    rows: Vec<DailyBar>,
}

impl CombinedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<DailyBar>) -> Self {
        Self { rows }
    }

    pub fn append_series(&mut self, series: Vec<DailyBar>) {
        self.rows.extend(series);
    }

    pub fn rows(&self) -> &[DailyBar] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers in first-appearance order.
    pub fn tickers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !out.contains(&row.ticker.as_str()) {
                out.push(row.ticker.as_str());
            }
        }
        out
    }

    pub fn rows_for<'a>(&'a self, ticker: &'a str) -> impl Iterator<Item = &'a DailyBar> + 'a {
        self.rows.iter().filter(move |r| r.ticker == ticker)
    }
}

/// Keep only the most recent `keep` bars of a date-ascending series.
pub fn tail_truncate(mut series: Vec<DailyBar>, keep: usize) -> Vec<DailyBar> {
    let skip = series.len().saturating_sub(keep);
    series.drain(..skip);
    series
}
