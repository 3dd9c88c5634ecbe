//! Market data - cached quotes for tradable symbols
//!
//! Quotes are stored in the database and refreshed from the external provider
//! when they are older than the threshold of their update frequency.

mod cache;
mod client;
mod symbol;

pub use cache::MarketDataCache;
pub use client::{MarketDataClient, ProviderQuote};
pub use symbol::{InvalidSymbol, Symbol};

use crate::db::DbError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(Symbol),
    #[error("Market data provider is not configured")]
    NotConfigured,
    #[error("Market data request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Market data provider returned HTTP {status} for {symbol}")]
    Provider { status: u16, symbol: Symbol },
    #[error("Invalid market data provider URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Database(#[from] DbError),
}

/// How often a quote is expected to change; decides when a cached copy is stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateFrequency {
    #[serde(rename = "realtime")]
    Realtime,
    #[serde(rename = "1min")]
    OneMin,
    #[serde(rename = "5min")]
    FiveMin,
    #[serde(rename = "15min")]
    FifteenMin,
    #[serde(rename = "30min")]
    ThirtyMin,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "1day")]
    OneDay,
}

impl UpdateFrequency {
    pub fn threshold(self) -> Duration {
        match self {
            Self::Realtime => Duration::seconds(10),
            Self::OneMin => Duration::minutes(1),
            Self::FiveMin => Duration::minutes(5),
            Self::FifteenMin => Duration::minutes(15),
            Self::ThirtyMin => Duration::minutes(30),
            Self::OneHour => Duration::hours(1),
            Self::OneDay => Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Etf,
    Crypto,
    Forex,
    Commodity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Suspended,
    Delisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub current: Decimal,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub previous_close: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeData {
    pub current: Option<i64>,
    pub average: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub value: Option<Decimal>,
    pub percentage: Option<Decimal>,
}

/// One daily bar of price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: i64,
}

/// Cached quote for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub symbol: Symbol,
    pub asset_type: AssetType,
    pub exchange: String,
    pub company_name: Option<String>,
    pub price: PriceData,
    pub volume: VolumeData,
    pub change: PriceChange,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub historical: Vec<HistoricalBar>,
    pub last_updated: DateTime<Utc>,
    pub update_frequency: UpdateFrequency,
    pub status: ListingStatus,
}

impl MarketData {
    /// True once the quote is older than its frequency threshold
    pub fn needs_update(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_updated) > self.update_frequency.threshold()
    }

    /// Bars within `[from, to]`, oldest first
    pub fn history_between(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<HistoricalBar> {
        let mut bars: Vec<HistoricalBar> = self
            .historical
            .iter()
            .filter(|bar| from.map_or(true, |f| bar.date >= f))
            .filter(|bar| to.map_or(true, |t| bar.date <= t))
            .cloned()
            .collect();
        bars.sort_by_key(|bar| bar.date);
        bars
    }
}

/// Gainers and losers by change percentage
#[derive(Debug, Clone, Serialize)]
pub struct TopMovers {
    pub gainers: Vec<MarketData>,
    pub losers: Vec<MarketData>,
}

#[cfg(test)]
pub(crate) fn sample_market_data(symbol: &str, price: Decimal, last_updated: DateTime<Utc>) -> MarketData {
    MarketData {
        symbol: Symbol::parse(symbol).unwrap(),
        asset_type: AssetType::Stock,
        exchange: "NASDAQ".to_string(),
        company_name: None,
        price: PriceData {
            current: price,
            open: None,
            high: None,
            low: None,
            close: None,
            previous_close: None,
        },
        volume: VolumeData {
            current: None,
            average: None,
        },
        change: PriceChange {
            value: None,
            percentage: None,
        },
        historical: Vec::new(),
        last_updated,
        update_frequency: UpdateFrequency::Realtime,
        status: ListingStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_needs_update_realtime_boundary() {
        let updated = Utc::now();
        let data = sample_market_data("AAPL", dec!(190), updated);

        assert!(!data.needs_update(updated + Duration::seconds(9)));
        assert!(!data.needs_update(updated + Duration::seconds(10)), "Exactly at threshold is still fresh");
        assert!(data.needs_update(updated + Duration::seconds(10) + Duration::milliseconds(1)));
    }

    #[test]
    fn test_needs_update_daily_boundary() {
        let updated = Utc::now();
        let mut data = sample_market_data("SPY", dec!(510), updated);
        data.update_frequency = UpdateFrequency::OneDay;

        assert!(!data.needs_update(updated + Duration::hours(23) + Duration::minutes(59)));
        assert!(data.needs_update(updated + Duration::hours(24) + Duration::seconds(1)));
    }

    #[test]
    fn test_frequency_names_round_trip() {
        let freq: UpdateFrequency = serde_json::from_str("\"15min\"").unwrap();
        assert_eq!(freq, UpdateFrequency::FifteenMin);
        assert_eq!(freq.threshold(), Duration::minutes(15));
        assert!(serde_json::from_str::<UpdateFrequency>("\"2min\"").is_err());
    }

    #[test]
    fn test_history_between_filters_and_sorts() {
        let mut data = sample_market_data("AAPL", dec!(190), Utc::now());
        let bar = |d: &str, close| HistoricalBar {
            date: d.parse().unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        };
        data.historical = vec![
            bar("2024-03-03", dec!(3)),
            bar("2024-03-01", dec!(1)),
            bar("2024-03-02", dec!(2)),
        ];

        let all = data.history_between(None, None);
        assert_eq!(all.iter().map(|b| b.close).collect::<Vec<_>>(), vec![dec!(1), dec!(2), dec!(3)]);

        let window = data.history_between(Some("2024-03-02".parse().unwrap()), None);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].close, dec!(2));
    }
}
