//! HTTP client for the external quote provider
//!
//! `GET {base}/quote/{symbol}` and `GET {base}/history/{symbol}`, bearer-token
//! authenticated. A 404 from the provider means the symbol does not exist.

use super::{
    AssetType, HistoricalBar, ListingStatus, MarketData, MarketDataError, PriceChange, PriceData,
    Symbol, UpdateFrequency, VolumeData,
};
use crate::config::MarketDataConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Quote payload as returned by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuote {
    pub price: Decimal,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub volume: Option<i64>,
    pub average_volume: Option<i64>,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
    pub exchange: Option<String>,
    pub name: Option<String>,
}

impl ProviderQuote {
    /// Build the cached record, keeping history and listing details from the
    /// previous copy when there is one.
    pub fn into_market_data(
        self,
        symbol: Symbol,
        previous: Option<MarketData>,
        now: DateTime<Utc>,
    ) -> MarketData {
        let (asset_type, historical, status, old_exchange, old_name) = match previous {
            Some(prev) => (
                prev.asset_type,
                prev.historical,
                prev.status,
                Some(prev.exchange),
                prev.company_name,
            ),
            None => (AssetType::Stock, Vec::new(), ListingStatus::Active, None, None),
        };

        MarketData {
            symbol,
            asset_type,
            exchange: self.exchange.or(old_exchange).unwrap_or_default(),
            company_name: self.name.or(old_name),
            price: PriceData {
                current: self.price,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
                previous_close: self.previous_close,
            },
            volume: VolumeData {
                current: self.volume,
                average: self.average_volume,
            },
            change: PriceChange {
                value: self.change,
                percentage: self.change_percent,
            },
            historical,
            last_updated: now,
            update_frequency: UpdateFrequency::Realtime,
            status,
        }
    }
}

pub struct MarketDataClient {
    http: Client,
    base_url: Option<Url>,
    api_key: Option<String>,
}

impl MarketDataClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("edutrade-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = config.api_url.as_deref().map(parse_base_url).transpose()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Fetch the latest quote for a symbol
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<ProviderQuote, MarketDataError> {
        let url = self.endpoint("quote", symbol)?;
        debug!("Fetching quote for {} from provider", symbol);
        let response = self.request(url).send().await?;
        let response = check_status(response, symbol)?;
        Ok(response.json::<ProviderQuote>().await?)
    }

    /// Fetch daily price history for a symbol
    pub async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<HistoricalBar>, MarketDataError> {
        let url = self.endpoint("history", symbol)?;
        debug!("Fetching history for {} from provider", symbol);
        let response = self.request(url).send().await?;
        let response = check_status(response, symbol)?;
        Ok(response.json::<Vec<HistoricalBar>>().await?)
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn endpoint(&self, kind: &str, symbol: &Symbol) -> Result<Url, MarketDataError> {
        let base = self.base_url.as_ref().ok_or(MarketDataError::NotConfigured)?;
        Ok(base.join(&format!("{}/{}", kind, symbol))?)
    }
}

/// Base URLs are joined with relative paths, so they must end in '/'
fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn check_status(
    response: reqwest::Response,
    symbol: &Symbol,
) -> Result<reqwest::Response, MarketDataError> {
    match response.status() {
        StatusCode::NOT_FOUND => Err(MarketDataError::SymbolNotFound(symbol.clone())),
        status if !status.is_success() => Err(MarketDataError::Provider {
            status: status.as_u16(),
            symbol: symbol.clone(),
        }),
        _ => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::sample_market_data;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_provider_quote() {
        let body = r#"{
            "price": 189.84,
            "open": 188.5,
            "high": 190.1,
            "low": 187.9,
            "close": 189.84,
            "previousClose": 187.2,
            "volume": 51234000,
            "averageVolume": 48000000,
            "change": 2.64,
            "changePercent": 1.41,
            "exchange": "NASDAQ",
            "name": "Apple Inc."
        }"#;
        let quote: ProviderQuote = serde_json::from_str(body).unwrap();
        assert_eq!(quote.price, dec!(189.84));
        assert_eq!(quote.previous_close, Some(dec!(187.2)));
        assert_eq!(quote.average_volume, Some(48_000_000));

        let now = Utc::now();
        let data = quote.into_market_data(Symbol::parse("AAPL").unwrap(), None, now);
        assert_eq!(data.price.current, dec!(189.84));
        assert_eq!(data.change.percentage, Some(dec!(1.41)));
        assert_eq!(data.exchange, "NASDAQ");
        assert_eq!(data.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(data.update_frequency, UpdateFrequency::Realtime);
        assert_eq!(data.last_updated, now);
    }

    #[test]
    fn test_refresh_keeps_previous_details() {
        let mut previous = sample_market_data("BTC-USD", dec!(60000), Utc::now());
        previous.asset_type = AssetType::Crypto;
        previous.company_name = Some("Bitcoin".to_string());

        let quote: ProviderQuote = serde_json::from_str(r#"{"price": 61000}"#).unwrap();
        let data = quote.into_market_data(previous.symbol.clone(), Some(previous), Utc::now());

        assert_eq!(data.asset_type, AssetType::Crypto);
        assert_eq!(data.company_name.as_deref(), Some("Bitcoin"));
        assert_eq!(data.exchange, "NASDAQ");
        assert_eq!(data.price.current, dec!(61000));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = MarketDataClient::new(&MarketDataConfig {
            api_url: Some("https://quotes.example.com/v1".to_string()),
            api_key: None,
        })
        .unwrap();

        let url = client.endpoint("quote", &Symbol::parse("msft").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://quotes.example.com/v1/quote/MSFT");
    }

    #[test]
    fn test_unconfigured_client() {
        let client = MarketDataClient::new(&MarketDataConfig::default()).unwrap();
        assert!(!client.is_configured());
        let err = client.endpoint("quote", &Symbol::parse("AAPL").unwrap()).unwrap_err();
        assert!(matches!(err, MarketDataError::NotConfigured));
    }
}
