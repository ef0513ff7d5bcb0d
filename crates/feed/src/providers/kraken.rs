use super::{number, optional_number, quote, PriceProvider};
use crate::http::HttpFetch;
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Kraken public ticker API URL
const KRAKEN_API_URL: &str = "https://api.kraken.com/0/public/Ticker";

/// Kraken 클라이언트
///
/// Kraken always answers 200 and reports failures in an `error` array, so
/// that array is checked before anything else. The ticker is nested under a
/// pair key that does not match the requested pair (`XBTUSD` → `XXBTZUSD`).
pub struct KrakenProvider {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl KrakenProvider {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self::with_base_url(http, KRAKEN_API_URL)
    }

    pub fn with_base_url(http: Arc<dyn HttpFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

pub fn parse(body: &str) -> FeedResult<CurrentPrice> {
    let json: Value = serde_json::from_str(body)?;

    if let Some(errors) = json.get("error").and_then(Value::as_array) {
        if !errors.is_empty() {
            let joined: Vec<String> = errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect();
            return Err(FeedError::Upstream(format!("kraken: {}", joined.join(", "))));
        }
    }

    let ticker = json
        .get("result")
        .and_then(Value::as_object)
        .and_then(|pairs| pairs.values().next())
        .ok_or_else(|| FeedError::Parse("kraken: empty result".to_string()))?;

    // c = [last trade price, lot volume], o = today's opening price
    let last = number(ticker.get("c").and_then(|c| c.get(0)), "result.*.c[0]")?;
    let change = optional_number(ticker.get("o"))
        .filter(|open| *open > 0.0)
        .map(|open| (last - open) / open * 100.0);

    quote(last, change, PriceSource::Kraken)
}

#[async_trait]
impl PriceProvider for KrakenProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Kraken
    }

    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice> {
        let url = format!("{}?pair={}", self.base_url, coin.kraken_pair());
        let body = self.http.get_text(&url, timeout).await?;
        parse(&body)
    }
}
