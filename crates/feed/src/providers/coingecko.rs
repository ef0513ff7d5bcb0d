use super::{number, optional_number, quote, PriceProvider};
use crate::http::HttpFetch;
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// CoinGecko simple price, the last resort in the chain (strict rate limits)
pub struct CoinGeckoProvider {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self::with_base_url(http, COINGECKO_API_URL)
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
    let entry = json
        .get(&coin.id)
        .ok_or_else(|| FeedError::Parse(format!("coingecko: no entry for {}", coin.id)))?;

    let price = number(entry.get("usd"), "usd")?;
    let change = optional_number(entry.get("usd_24h_change"));

    quote(price, change, PriceSource::Coingecko)
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Coingecko
    }

    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice> {
        let url = format!(
            "{}?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url, coin.id
        );
        let body = self.http.get_text(&url, timeout).await?;
        parse(&body, coin)
    }
}
