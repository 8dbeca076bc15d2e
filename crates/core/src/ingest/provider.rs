use crate::domain::bar::DailyBar;
use crate::ingest::types::FetchError;

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Every daily bar the provider returned for `ticker`, tagged with the
    /// ticker and sorted by ascending date.
    async fn fetch_daily_series(&self, ticker: &str) -> Result<Vec<DailyBar>, FetchError>;
}
