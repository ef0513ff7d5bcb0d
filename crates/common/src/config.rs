//! Configuration passed to the controller and its fetchers.
//!
//! Everything is a plain parameter struct; nothing is read from the
//! environment or from files.

use crate::types::Coin;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 최대 재시도 횟수 (첫 시도 제외)
pub const MAX_RETRIES: u32 = 3;
/// 현재가 요청 타임아웃
pub const PRICE_TIMEOUT: Duration = Duration::from_secs(5);
/// 히스토리 요청 타임아웃
pub const HISTORY_TIMEOUT: Duration = Duration::from_secs(8);
/// 캐시 유효 시간
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Exponential backoff applied between attempts against one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt, so a provider gets `max_retries + 1` tries.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// 재시도 없이 한 번만 시도
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay after the failed attempt `attempt` (0-indexed): 1s, 2s, 4s, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// 컨트롤러 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub coin: Coin,
    /// 히스토리 조회 일수
    pub days: u32,
    /// 주기적 갱신 간격
    pub poll_interval: Duration,
    pub price_timeout: Duration,
    pub history_timeout: Duration,
    pub cache_ttl: Duration,
    pub retry: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            coin: Coin::bitcoin(),
            days: 365,
            poll_interval: Duration::from_secs(60),
            price_timeout: PRICE_TIMEOUT,
            history_timeout: HISTORY_TIMEOUT,
            cache_ttl: CACHE_TTL,
            retry: RetryConfig::default(),
        }
    }
}
