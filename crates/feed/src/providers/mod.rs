//! Current-price providers.
//!
//! Every upstream has its own endpoint and payload shape; each adapter
//! normalizes its response into a [`CurrentPrice`] so the resolver can walk
//! them as a plain list.

pub mod binance;
pub mod coincap;
pub mod coingecko;
pub mod cryptocompare;
pub mod kraken;

use crate::http::HttpFetch;
use async_trait::async_trait;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use binance::BinanceProvider;
pub use coincap::CoinCapProvider;
pub use coingecko::CoinGeckoProvider;
pub use cryptocompare::CryptoCompareProvider;
pub use kraken::KrakenProvider;

/// Price provider trait for different exchanges and aggregators
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Which upstream this adapter talks to
    fn source(&self) -> PriceSource;

    /// Fetch the current USD price of `coin` (single attempt, no retries)
    async fn fetch_current(&self, coin: &Coin, timeout: Duration) -> FeedResult<CurrentPrice>;
}

/// 기본 공급자 체인: 신뢰도 순서
pub fn default_providers(http: Arc<dyn HttpFetch>) -> Vec<Arc<dyn PriceProvider>> {
    vec![
        Arc::new(CoinCapProvider::new(http.clone())),
        Arc::new(BinanceProvider::new(http.clone())),
        Arc::new(KrakenProvider::new(http.clone())),
        Arc::new(CryptoCompareProvider::new(http.clone())),
        Arc::new(CoinGeckoProvider::new(http)),
    ]
}

/// Reads a JSON number that some APIs send as a string (`"43000.12"`).
pub(crate) fn number(value: Option<&Value>, field: &str) -> FeedResult<f64> {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FeedError::Parse(format!("{} is not a float", field))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FeedError::Parse(format!("{} is not numeric: {:?}", field, s))),
        Some(Value::Null) | None => Err(FeedError::Parse(format!("missing {}", field))),
        Some(other) => Err(FeedError::Parse(format!("unexpected {}: {}", field, other))),
    }
}

/// Same as [`number`] but absence is fine.
pub(crate) fn optional_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Null) | None => None,
        some => number(some, "").ok(),
    }
}

/// 파싱된 시세를 검증해 `CurrentPrice`로 만든다
pub(crate) fn quote(
    price: f64,
    change_24h: Option<f64>,
    source: PriceSource,
) -> FeedResult<CurrentPrice> {
    CurrentPrice::from_quote(price, change_24h, source)
        .ok_or_else(|| FeedError::InvalidPrice(format!("{} returned {}", source, price)))
}
