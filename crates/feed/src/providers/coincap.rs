use super::{number, optional_number, quote, PriceProvider};
use crate::http::HttpFetch;
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// CoinCap v2 API URL
const COINCAP_API_URL: &str = "https://api.coincap.io/v2/assets";

/// CoinCap 클라이언트
///
/// `{"data": {"priceUsd": "43000.12", "changePercent24Hr": "1.23"}}`
pub struct CoinCapProvider {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl CoinCapProvider {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self::with_base_url(http, COINCAP_API_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, coin: &Coin) -> String {
        format!("{}/{}", self.base_url, coin.id)
    }
}

pub fn parse(body: &str) -> FeedResult<CurrentPrice> {
    let json: Value = serde_json::from_str(body)?;
    let data = json
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| FeedError::Parse("coincap: missing data object".to_string()))?;

    let price = number(data.get("priceUsd"), "data.priceUsd")?;
    let change = optional_number(data.get("changePercent24Hr"));

    quote(price, change, PriceSource::Coincap)
}

#[async_trait]
impl PriceProvider for CoinCapProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Coincap
    }

    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice> {
        let body = self.http.get_text(&self.url(coin), timeout).await?;
        parse(&body)
    }
}
