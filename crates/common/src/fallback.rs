use crate::types::{Coin, CurrentPrice, PricePoint, PriceSource};

/// 손으로 정리한 BTC 월별 대략 가격 (USD)
///
/// Keys must stay sorted ascending; `latest()` relies on it.
const BTC_MONTHLY_USD: &[(&str, u64)] = &[
    ("2023-01", 21_100),
    ("2023-02", 23_500),
    ("2023-03", 25_000),
    ("2023-04", 29_200),
    ("2023-05", 27_400),
    ("2023-06", 27_000),
    ("2023-07", 30_200),
    ("2023-08", 28_000),
    ("2023-09", 26_300),
    ("2023-10", 29_500),
    ("2023-11", 36_500),
    ("2023-12", 42_600),
    ("2024-01", 42_800),
    ("2024-02", 50_100),
    ("2024-03", 68_300),
    ("2024-04", 65_200),
    ("2024-05", 65_500),
    ("2024-06", 66_000),
    ("2024-07", 62_100),
    ("2024-08", 59_800),
    ("2024-09", 59_100),
    ("2024-10", 65_400),
    ("2024-11", 87_200),
    ("2024-12", 97_100),
];

/// Static month → price table used when no live or cached data exists.
#[derive(Debug, Clone, Copy)]
pub struct FallbackTable {
    coin_id: &'static str,
    entries: &'static [(&'static str, u64)],
}

impl FallbackTable {
    pub fn bitcoin() -> Self {
        Self {
            coin_id: "bitcoin",
            entries: BTC_MONTHLY_USD,
        }
    }

    /// Id of the coin the table was compiled for.
    pub fn coin_id(&self) -> &'static str {
        self.coin_id
    }

    pub fn covers(&self, coin: &Coin) -> bool {
        coin.id == self.coin_id
    }

    /// 배열 형태의 시리즈 (월 오름차순)
    pub fn series(&self) -> Vec<PricePoint> {
        self.entries
            .iter()
            .map(|(month, price)| PricePoint::new(*month, *price))
            .collect()
    }

    /// 사전순으로 가장 마지막 월의 항목
    pub fn latest(&self) -> Option<PricePoint> {
        self.entries
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .map(|(month, price)| PricePoint::new(*month, *price))
    }

    /// 테이블 마지막 월 기준의 현재가
    pub fn current_price(&self) -> CurrentPrice {
        CurrentPrice {
            price: self.latest().map(|p| p.price).unwrap_or(0),
            change_24h: None,
            source: PriceSource::Fallback,
        }
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::bitcoin()
    }
}
