use crate::providers::PriceProvider;
use coinwatch_common::config::RetryConfig;
use coinwatch_common::{Coin, CurrentPrice, FeedError, FeedResult, PriceSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// 공급자 하나가 모든 시도를 소진한 기록
#[derive(Debug)]
pub struct ProviderFailure {
    pub source: PriceSource,
    pub attempts: u32,
    pub error: FeedError,
}

/// 체인 실행 결과. Total failure is a value, not an error.
#[derive(Debug)]
pub enum Resolution {
    Resolved(CurrentPrice),
    Exhausted(Vec<ProviderFailure>),
}

impl Resolution {
    pub fn price(&self) -> Option<&CurrentPrice> {
        match self {
            Resolution::Resolved(price) => Some(price),
            Resolution::Exhausted(_) => None,
        }
    }

    pub fn into_price(self) -> Option<CurrentPrice> {
        match self {
            Resolution::Resolved(price) => Some(price),
            Resolution::Exhausted(_) => None,
        }
    }
}

/// Walks an ordered provider list, one provider at a time, with retries.
pub struct SourceChainResolver {
    providers: Vec<Arc<dyn PriceProvider>>,
    retry: RetryConfig,
}

impl SourceChainResolver {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, retry: RetryConfig) -> Self {
        Self { providers, retry }
    }

    /// 첫 번째로 유효한 가격을 돌려준 공급자에서 멈춘다
    pub async fn resolve(&self, coin: &Coin, timeout: Duration) -> Resolution {
        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match self.fetch_with_retry(provider.as_ref(), coin, timeout).await {
                Ok(price) => return Resolution::Resolved(price),
                Err(error) => {
                    warn!(
                        "Abandoning {} after {} attempts: {}",
                        provider.source(),
                        self.retry.total_attempts(),
                        error
                    );
                    failures.push(ProviderFailure {
                        source: provider.source(),
                        attempts: self.retry.total_attempts(),
                        error,
                    });
                }
            }
        }

        error!("❌ Every price provider failed ({} tried)", failures.len());
        Resolution::Exhausted(failures)
    }

    /// 재시도 로직이 포함된 가격 가져오기
    async fn fetch_with_retry(
        &self,
        provider: &dyn PriceProvider,
        coin: &Coin,
        timeout: Duration,
    ) -> FeedResult<CurrentPrice> {
        let attempts = self.retry.total_attempts();
        let mut attempt = 0;

        loop {
            info!(
                "Fetching {} price from {} (attempt {}/{})",
                coin.symbol,
                provider.source(),
                attempt + 1,
                attempts
            );

            let fetch = provider.fetch_current(coin, timeout);
            let outcome = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout(timeout)),
            };

            match outcome {
                Ok(price) => {
                    info!("✅ {} price from {}: ${}", coin.symbol, provider.source(), price.price);
                    return Ok(price);
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "❌ {} failed (attempt {}): {}. Retrying in {:?}...",
                        provider.source(),
                        attempt + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
