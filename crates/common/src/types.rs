use serde::{Deserialize, Serialize};
use std::fmt;

/// 월별 평균 가격 한 칸 (차트 시리즈의 원소)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// `YYYY-MM`
    pub month: String,
    /// USD, 정수 단위
    pub price: u64,
}

impl PricePoint {
    pub fn new(month: impl Into<String>, price: u64) -> Self {
        Self {
            month: month.into(),
            price,
        }
    }
}

/// 가격의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Coincap,
    Binance,
    Kraken,
    Cryptocompare,
    Coingecko,
    Fallback,
    Cache,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Coincap => "coincap",
            PriceSource::Binance => "binance",
            PriceSource::Kraken => "kraken",
            PriceSource::Cryptocompare => "cryptocompare",
            PriceSource::Coingecko => "coingecko",
            PriceSource::Fallback => "fallback",
            PriceSource::Cache => "cache",
        }
    }

    /// 실시간 거래소/집계 API에서 온 값인지 여부
    pub fn is_live(&self) -> bool {
        !matches!(self, PriceSource::Fallback | PriceSource::Cache)
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 현재 가격 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPrice {
    pub price: u64,
    pub change_24h: Option<f64>,
    pub source: PriceSource,
}

impl CurrentPrice {
    /// Rounds a raw USD quote to whole dollars.
    ///
    /// Returns `None` for NaN, infinite or negative quotes so callers can
    /// treat them as a malformed payload.
    pub fn from_quote(price: f64, change_24h: Option<f64>, source: PriceSource) -> Option<Self> {
        if !price.is_finite() || price < 0.0 {
            return None;
        }

        Some(Self {
            price: price.round() as u64,
            change_24h: change_24h.filter(|c| c.is_finite()),
            source,
        })
    }
}

/// 캐시에 저장되는 마지막 성공 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub price_data: Vec<PricePoint>,
    pub current_price: CurrentPrice,
    /// epoch milliseconds
    pub timestamp: i64,
}

/// 히스토리 API가 돌려주는 원시 샘플 `[timestamp_ms, price]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl RawSample {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }
}

/// 조회 대상 코인 식별자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// CoinGecko/CoinCap 스타일 id (예: `bitcoin`)
    pub id: String,
    /// 티커 심볼 (예: `BTC`)
    pub symbol: String,
}

impl Coin {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into().to_uppercase(),
        }
    }

    pub fn bitcoin() -> Self {
        Self::new("bitcoin", "BTC")
    }

    /// Binance spot pair, quoted in USDT
    pub fn binance_pair(&self) -> String {
        format!("{}USDT", self.symbol)
    }

    /// Kraken uses `XBT` for bitcoin
    pub fn kraken_pair(&self) -> String {
        let base = if self.symbol == "BTC" { "XBT" } else { self.symbol.as_str() };
        format!("{}USD", base)
    }
}

impl Default for Coin {
    fn default() -> Self {
        Self::bitcoin()
    }
}
