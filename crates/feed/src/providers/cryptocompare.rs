use super::{number, optional_number, quote, PriceProvider};
use crate::http::HttpFetch;
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const CRYPTOCOMPARE_API_URL: &str = "https://min-api.cryptocompare.com/data/pricemultifull";

/// CryptoCompare: `RAW.{SYM}.USD.PRICE`
pub struct CryptoCompareProvider {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl CryptoCompareProvider {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self::with_base_url(http, CRYPTOCOMPARE_API_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

pub fn parse(body: &str, coin: &Coin) -> FeedResult<CurrentPrice> {
    let json: Value = serde_json::from_str(body)?;

    // 실패 시 {"Response":"Error","Message":"..."}
    if json.get("Response").and_then(Value::as_str) == Some("Error") {
        let message = json
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(FeedError::Upstream(format!("cryptocompare: {}", message)));
    }

    let usd = json
        .get("RAW")
        .and_then(|raw| raw.get(&coin.symbol))
        .and_then(|sym| sym.get("USD"))
        .ok_or_else(|| FeedError::Parse(format!("cryptocompare: no RAW.{}.USD", coin.symbol)))?;

    let price = number(usd.get("PRICE"), "PRICE")?;
    let change = optional_number(usd.get("CHANGEPCT24HOUR"));

    quote(price, change, PriceSource::Cryptocompare)
}

#[async_trait]
impl PriceProvider for CryptoCompareProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Cryptocompare
    }

    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice> {
        let url = format!("{}?fsyms={}&tsyms=USD", self.base_url, coin.symbol);
        let body = self.http.get_text(&url, timeout).await?;
        parse(&body, coin)
    }
}
