use super::{quote, PriceProvider};
use crate::http::{get_json, HttpFetch};
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Binance 24시간 티커 API URL
const BINANCE_API_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";

/// Binance가 돌려주는 24hr 티커 (숫자가 문자열로 옴)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    last_price: String,
    price_change_percent: Option<String>,
}

pub struct BinanceProvider {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self::with_base_url(http, BINANCE_API_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

fn to_current(ticker: BinanceTicker) -> FeedResult<CurrentPrice> {
    let price = ticker
        .last_price
        .parse::<f64>()
        .map_err(|_| FeedError::Parse(format!("binance: lastPrice {:?}", ticker.last_price)))?;
    let change = ticker
        .price_change_percent
        .and_then(|c| c.parse::<f64>().ok());

    quote(price, change, PriceSource::Binance)
}

pub fn parse(body: &str) -> FeedResult<CurrentPrice> {
    let ticker: BinanceTicker = serde_json::from_str(body)?;
    to_current(ticker)
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Binance
    }

    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice> {
        let url = format!("{}?symbol={}", self.base_url, coin.binance_pair());
        let ticker: BinanceTicker = get_json(self.http.as_ref(), &url, timeout).await?;
        to_current(ticker)
    }
}
