pub mod alpha_vantage;
pub mod collector;
pub mod provider;
pub mod types;

/// B3 tickers collected when no explicit watch-list is given.
pub const DEFAULT_WATCH_LIST: &[&str] = &[
    "PETR4", "VALE3", "ITUB4", "BBDC4", "ABEV3", "B3SA3", "WEGE3", "RENT3", "MGLU3",
];
