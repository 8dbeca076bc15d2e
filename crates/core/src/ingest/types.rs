use crate::domain::bar::DailyBar;
use chrono::NaiveDate;
use serde_json::Value;
use std::fmt::Display;

pub const TIME_SERIES_DAILY_KEY: &str = "Time Series (Daily)";
pub const NOTE_KEY: &str = "Note";
pub const INFORMATION_KEY: &str = "Information";

const OPEN_FIELD: &str = "1. open";
const HIGH_FIELD: &str = "2. high";
const LOW_FIELD: &str = "3. low";
const CLOSE_FIELD: &str = "4. close";
const VOLUME_FIELD: &str = "5. volume";

/// Why a single ticker produced no bars.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{ticker}: HTTP {status}: {body}")]
    HttpStatus {
        ticker: String,
        status: u16,
        body: String,
    },

    /// Status 200, but the provider answered with a rate-limit or informational notice.
    #[error("{ticker}: provider notice: {message}")]
    RateLimitNotice { ticker: String, message: String },

    #[error("{ticker}: no 'Time Series (Daily)' in response: {payload}")]
    MalformedResponse { ticker: String, payload: String },

    #[error("{ticker}: {detail}")]
    Unexpected { ticker: String, detail: String },
}

impl FetchError {
    pub fn unexpected(ticker: &str, detail: impl Display) -> Self {
        Self::Unexpected {
            ticker: ticker.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            Self::HttpStatus { ticker, .. }
            | Self::RateLimitNotice { ticker, .. }
            | Self::MalformedResponse { ticker, .. }
            | Self::Unexpected { ticker, .. } => ticker,
        }
    }
}

/// Classify a status-200 `TIME_SERIES_DAILY` payload and turn it into bars.
///
/// A `Note`/`Information` marker wins over any series data in the same payload.
pub fn parse_daily_series(ticker: &str, payload: &Value) -> Result<Vec<DailyBar>, FetchError> {
    if let Some(notice) = payload.get(NOTE_KEY).or_else(|| payload.get(INFORMATION_KEY)) {
        let message = match notice {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(FetchError::RateLimitNotice {
            ticker: ticker.to_string(),
            message,
        });
    }

    let Some(series) = payload.get(TIME_SERIES_DAILY_KEY).and_then(Value::as_object) else {
        return Err(FetchError::MalformedResponse {
            ticker: ticker.to_string(),
            payload: payload.to_string(),
        });
    };

    let mut bars = Vec::with_capacity(series.len());
    for (day, fields) in series {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|err| FetchError::unexpected(ticker, format!("invalid date {day:?}: {err}")))?;

        let field = |name: &str| -> Result<f64, FetchError> {
            let value = fields.get(name).ok_or_else(|| {
                FetchError::unexpected(ticker, format!("{day}: missing field {name:?}"))
            })?;
            parse_num(value).ok_or_else(|| {
                FetchError::unexpected(ticker, format!("{day}: non-numeric {name:?}: {value}"))
            })
        };

        bars.push(DailyBar {
            ticker: ticker.to_string(),
            date,
            open: field(OPEN_FIELD)?,
            high: field(HIGH_FIELD)?,
            low: field(LOW_FIELD)?,
            close: field(CLOSE_FIELD)?,
            volume: field(VOLUME_FIELD)?,
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

// Alpha Vantage sends numbers as strings; accept bare JSON numbers too.
fn parse_num(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()
        }
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ohlcv(open: &str, close: &str) -> Value {
        json!({
            "1. open": open,
            "2. high": "40.0000",
            "3. low": "30.0000",
            "4. close": close,
            "5. volume": "51234500",
        })
    }

    #[test]
    fn parses_and_sorts_series_ascending() {
        let payload = json!({
            "Meta Data": {"2. Symbol": "PETR4.SA"},
            "Time Series (Daily)": {
                "2025-03-07": ohlcv("38.10", "38.45"),
                "2025-03-05": ohlcv("37.00", "37.20"),
                "2025-03-06": ohlcv("37.25", "38.05"),
            }
        });

        let bars = parse_daily_series("PETR4", &payload).unwrap();
        let days: Vec<_> = bars.iter().map(|b| b.date.to_string()).collect();
        assert_eq!(days, vec!["2025-03-05", "2025-03-06", "2025-03-07"]);
        assert!(bars.iter().all(|b| b.ticker == "PETR4"));
        assert_eq!(bars[2].open, 38.10);
        assert_eq!(bars[2].close, 38.45);
        assert_eq!(bars[0].volume, 51_234_500.0);
    }

    #[test]
    fn note_marker_is_a_soft_failure() {
        let payload = json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."});
        match parse_daily_series("VALE3", &payload) {
            Err(FetchError::RateLimitNotice { ticker, message }) => {
                assert_eq!(ticker, "VALE3");
                assert!(message.contains("5 calls per minute"));
            }
            other => panic!("expected RateLimitNotice, got {other:?}"),
        }
    }

    #[test]
    fn information_marker_wins_over_series_data() {
        let payload = json!({
            "Information": "premium endpoint",
            "Time Series (Daily)": {"2025-03-05": ohlcv("1", "2")},
        });
        assert!(matches!(
            parse_daily_series("ITUB4", &payload),
            Err(FetchError::RateLimitNotice { .. })
        ));
    }

    #[test]
    fn missing_series_key_is_malformed_and_keeps_payload() {
        let payload = json!({"Error Message": "Invalid API call."});
        match parse_daily_series("XXXX3", &payload) {
            Err(FetchError::MalformedResponse { payload, .. }) => {
                assert!(payload.contains("Invalid API call."));
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_value_is_unexpected() {
        let payload = json!({
            "Time Series (Daily)": {"2025-03-05": ohlcv("n/a", "2")},
        });
        let err = parse_daily_series("BBDC4", &payload).unwrap_err();
        assert!(matches!(err, FetchError::Unexpected { .. }));
        assert_eq!(err.ticker(), "BBDC4");
    }

    #[test]
    fn empty_series_object_yields_no_bars() {
        let payload = json!({"Time Series (Daily)": {}});
        assert!(parse_daily_series("ABEV3", &payload).unwrap().is_empty());
    }
}
