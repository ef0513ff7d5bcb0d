use crate::relay::ProxyRaceFetcher;
use async_trait::async_trait;
use coinwatch_common::{Coin, FeedError, FeedResult, RawSample};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// CoinGecko API URL (브라우저에서 직접 호출 불가, 릴레이 경유)
const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko market_chart 응답
/// `prices`: [timestamp_ms, price]
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    prices: Vec<[f64; 2]>,
}

/// 장기 시계열 공급원
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(
        &self,
        coin: &Coin,
        days: u32,
        timeout: Duration,
    ) -> FeedResult<Vec<RawSample>>;
}

/// CoinGecko market chart fetched through the relay race.
pub struct RelayedCoinGeckoHistory {
    race: ProxyRaceFetcher,
    base_url: String,
}

impl RelayedCoinGeckoHistory {
    pub fn new(race: ProxyRaceFetcher) -> Self {
        Self::with_base_url(race, COINGECKO_API_URL)
    }

    pub fn with_base_url(race: ProxyRaceFetcher, base_url: impl Into<String>) -> Self {
        Self {
            race,
            base_url: base_url.into(),
        }
    }

    pub fn chart_url(&self, coin: &Coin, days: u32) -> String {
        format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}&interval=daily",
            self.base_url, coin.id, days
        )
    }
}

pub fn parse_market_chart(body: &str) -> FeedResult<Vec<RawSample>> {
    let chart: MarketChartResponse = serde_json::from_str(body)?;
    if chart.prices.is_empty() {
        return Err(FeedError::Parse("market_chart: empty prices".to_string()));
    }

    Ok(chart
        .prices
        .into_iter()
        .map(|[ts, price]| RawSample::new(ts as i64, price))
        .collect())
}

#[async_trait]
impl HistorySource for RelayedCoinGeckoHistory {
    async fn fetch_history(
        &self,
        coin: &Coin,
        days: u32,
        timeout: Duration,
    ) -> FeedResult<Vec<RawSample>> {
        let body = self.race.fetch(&self.chart_url(coin, days), timeout).await?;
        let samples = parse_market_chart(&body)?;
        info!("📊 {} history: {} samples over {} days", coin.symbol, samples.len(), days);
        Ok(samples)
    }
}
