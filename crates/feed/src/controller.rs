//! 집계 컨트롤러
//!
//! Owns the polling timer, the reentrancy guard and the published view.
//! Each cycle resolves the current price and fetches the history
//! concurrently, merges whatever came back, substitutes the fallback table
//! for anything missing and persists the result when the history was live.

use crate::cache::{CacheBackend, CacheStore, DEFAULT_CACHE_KEY};
use crate::history::{HistorySource, RelayedCoinGeckoHistory};
use crate::http::HttpFetch;
use crate::providers::default_providers;
use crate::relay::ProxyRaceFetcher;
use crate::resolver::{Resolution, SourceChainResolver};
use chrono::{DateTime, TimeZone, Utc};
use coinwatch_common::config::ControllerConfig;
use coinwatch_common::fallback::FallbackTable;
use coinwatch_common::series::{bucket_monthly, latest_price};
use coinwatch_common::{CurrentPrice, FeedError, FeedResult, PricePoint, PriceSource, RawSample};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How much of a cycle came from live sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// 현재가와 히스토리 모두 실시간
    Live,
    /// 둘 중 하나만 성공
    Partial,
    /// 둘 다 실패, 정적 테이블 표시 중
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "settlement", rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    CacheHydrated,
    Fetching,
    Settled(Settlement),
}

/// 화면이 폴링하는 상태
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub price_data: Vec<PricePoint>,
    pub current_price: Option<CurrentPrice>,
    pub loading: bool,
    /// Always cleared once a cycle settles, even on total failure.
    /// Use `phase` and `last_failure` to tell a fallback display apart.
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_live: bool,
    /// `cache`, a provider name or `fallback`
    pub data_source: String,
    pub phase: Phase,
    pub last_failure: Option<String>,
}

impl DashboardView {
    fn initial() -> Self {
        Self {
            price_data: Vec::new(),
            current_price: None,
            loading: true,
            error: None,
            last_updated: None,
            is_live: false,
            data_source: "none".to_string(),
            phase: Phase::Uninitialized,
            last_failure: None,
        }
    }

    /// One-line human summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let price = match &self.current_price {
            Some(p) => match p.change_24h {
                Some(change) => format!("${} ({:+.2}%)", p.price, change),
                None => format!("${}", p.price),
            },
            None => "-".to_string(),
        };
        let range = match (self.price_data.first(), self.price_data.last()) {
            (Some(first), Some(last)) => format!("{}..{}", first.month, last.month),
            _ => "no history".to_string(),
        };
        let updated = self
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        format!(
            "{} via {}{} | {} months ({}) | updated {}",
            price,
            self.data_source,
            if self.is_live { " [live]" } else { "" },
            self.price_data.len(),
            range,
            updated
        )
    }
}

/// 한 사이클의 병합 결과
struct CycleOutcome {
    price_data: Vec<PricePoint>,
    current_price: CurrentPrice,
    settlement: Settlement,
    failure: Option<String>,
    persist: bool,
}

struct Inner {
    config: ControllerConfig,
    resolver: SourceChainResolver,
    history: Arc<dyn HistorySource>,
    cache: CacheStore,
    fallback: FallbackTable,
    view: watch::Sender<DashboardView>,
    in_flight: AtomicBool,
    cycles: AtomicU64,
}

/// Clears the in-flight flag even if the cycle future is dropped midway.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 사이클이 취소되면 작업자 태스크도 함께 중단한다
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct AggregationController {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationController {
    pub fn new(
        config: ControllerConfig,
        resolver: SourceChainResolver,
        history: Arc<dyn HistorySource>,
        cache: CacheStore,
    ) -> Self {
        let (view, _) = watch::channel(DashboardView::initial());

        Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                history,
                cache,
                fallback: FallbackTable::default(),
                view,
                in_flight: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
        }
    }

    /// 기본 공급자 체인과 릴레이로 구성
    pub fn with_defaults(
        config: ControllerConfig,
        http: Arc<dyn HttpFetch>,
        cache_backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let resolver =
            SourceChainResolver::new(default_providers(http.clone()), config.retry.clone());
        let history = Arc::new(RelayedCoinGeckoHistory::new(
            ProxyRaceFetcher::with_default_relays(http),
        ));
        let cache = CacheStore::with_key(
            cache_backend,
            format!("{}.{}", DEFAULT_CACHE_KEY, config.coin.id),
            config.cache_ttl,
        );

        Self::new(config, resolver, history, cache)
    }

    /// Current snapshot of the view.
    pub fn view(&self) -> DashboardView {
        self.inner.view.borrow().clone()
    }

    /// 상태가 바뀔 때마다 알림을 받는 수신기
    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.inner.view.subscribe()
    }

    /// Number of cycles that ran to completion.
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// 캐시에서 즉시 화면을 채운다 (네트워크 없음)
    ///
    /// Only acts before the first cycle; returns whether a fresh snapshot
    /// was found.
    pub fn hydrate(&self) -> bool {
        self.inner.hydrate()
    }

    /// Runs one cycle now unless one is already running.
    ///
    /// Returns `false` when the call was suppressed by the reentrancy guard.
    pub async fn refetch(&self) -> bool {
        self.inner.run_cycle().await
    }

    /// Hydrates from the cache and arms the periodic refresh timer.
    ///
    /// A fresh cache defers the first cycle to the first tick; otherwise a
    /// cycle starts right away. Must be called inside a tokio runtime.
    pub fn mount(&self) {
        let hydrated = self.inner.hydrate();
        let inner = Arc::clone(&self.inner);
        let period = self.inner.config.poll_interval;

        let handle = tokio::spawn(async move {
            if !hydrated {
                inner.run_cycle().await;
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.run_cycle().await;
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
        info!(
            "Controller mounted for {} (every {:?})",
            self.inner.config.coin.id, period
        );
    }

    /// 타이머 해제
    pub fn unmount(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
            info!("Controller unmounted for {}", self.inner.config.coin.id);
        }
    }
}

impl Drop for AggregationController {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl Inner {
    fn hydrate(&self) -> bool {
        if self.view.borrow().phase != Phase::Uninitialized {
            return false;
        }

        let Some(entry) = self.cache.load() else {
            debug!("No fresh cache entry for {}", self.cache.key());
            return false;
        };

        info!(
            "Hydrated {} months and ${} from cache",
            entry.price_data.len(),
            entry.current_price.price
        );
        self.view.send_modify(|view| {
            view.price_data = entry.price_data;
            view.current_price = Some(entry.current_price);
            view.loading = false;
            view.error = None;
            view.last_updated = Utc.timestamp_millis_opt(entry.timestamp).single();
            view.is_live = false;
            view.data_source = PriceSource::Cache.to_string();
            view.phase = Phase::CacheHydrated;
        });
        true
    }

    async fn run_cycle(self: &Arc<Self>) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Cycle already in progress, trigger ignored");
            return false;
        }
        let _guard = FlightGuard(&self.in_flight);

        self.view.send_modify(|view| {
            view.phase = Phase::Fetching;
            view.loading = view.price_data.is_empty();
        });

        // 작업자 패닉도 전체 실패 경로로 흡수한다
        // The worker must not outlive this future, or it would still be
        // fetching after the flight guard has been released.
        let worker = Arc::clone(self);
        let mut worker = AbortOnDrop(tokio::spawn(async move { worker.fetch_both().await }));
        let outcome = match (&mut worker.0).await {
            Ok((resolution, history)) => self.merge(resolution, history),
            Err(e) => {
                error!("Aggregation cycle aborted: {}", e);
                self.total_failure(format!("cycle aborted: {}", e))
            }
        };

        self.settle(outcome);
        self.cycles.fetch_add(1, Ordering::AcqRel);
        true
    }

    async fn fetch_both(&self) -> (Resolution, FeedResult<Vec<RawSample>>) {
        let coin = &self.config.coin;
        let history = async {
            match tokio::time::timeout(
                self.config.history_timeout,
                self.history
                    .fetch_history(coin, self.config.days, self.config.history_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout(self.config.history_timeout)),
            }
        };

        tokio::join!(
            self.resolver.resolve(coin, self.config.price_timeout),
            history
        )
    }

    fn merge(&self, resolution: Resolution, history: FeedResult<Vec<RawSample>>) -> CycleOutcome {
        let series = history.and_then(|samples| {
            let series = bucket_monthly(&samples);
            if series.is_empty() {
                Err(FeedError::Parse("history had no usable samples".to_string()))
            } else {
                Ok(series)
            }
        });

        match (resolution.into_price(), series) {
            (Some(current_price), Ok(price_data)) => CycleOutcome {
                price_data,
                current_price,
                settlement: Settlement::Live,
                failure: None,
                persist: true,
            },
            (None, Ok(price_data)) => {
                // 현재가 체인이 전부 실패하면 가장 최근 월 평균으로 대신한다
                let price = latest_price(&price_data).unwrap_or(0);
                CycleOutcome {
                    price_data,
                    current_price: CurrentPrice {
                        price,
                        change_24h: None,
                        source: PriceSource::Coingecko,
                    },
                    settlement: Settlement::Partial,
                    failure: Some("all price providers failed".to_string()),
                    persist: true,
                }
            }
            (Some(current_price), Err(e)) => CycleOutcome {
                price_data: self.fallback_series(),
                current_price,
                settlement: Settlement::Partial,
                failure: Some(format!("history unavailable: {}", e)),
                persist: false,
            },
            (None, Err(e)) => self.total_failure(format!(
                "all price providers failed; history unavailable: {}",
                e
            )),
        }
    }

    /// The static table only knows bitcoin; say so when showing it for another coin.
    fn fallback_series(&self) -> Vec<PricePoint> {
        let coin = &self.config.coin;
        if !self.fallback.covers(coin) {
            warn!(
                "Fallback table has no {} data, showing {} prices instead",
                coin.id,
                self.fallback.coin_id()
            );
        }
        self.fallback.series()
    }

    fn total_failure(&self, reason: String) -> CycleOutcome {
        CycleOutcome {
            price_data: self.fallback_series(),
            current_price: self.fallback.current_price(),
            settlement: Settlement::Fallback,
            failure: Some(reason),
            persist: false,
        }
    }

    fn settle(&self, outcome: CycleOutcome) {
        if outcome.persist {
            self.cache.save(&outcome.price_data, &outcome.current_price);
        }

        match (&outcome.settlement, &outcome.failure) {
            (Settlement::Live, _) => info!(
                "✅ Cycle settled live: ${} via {}, {} months",
                outcome.current_price.price,
                outcome.current_price.source,
                outcome.price_data.len()
            ),
            (settlement, Some(reason)) => warn!(
                "Cycle settled {:?}: ${} via {} ({})",
                settlement, outcome.current_price.price, outcome.current_price.source, reason
            ),
            (settlement, None) => warn!("Cycle settled {:?}", settlement),
        }

        let is_live =
            outcome.settlement != Settlement::Fallback && outcome.current_price.source.is_live();
        self.view.send_modify(|view| {
            view.price_data = outcome.price_data;
            view.data_source = outcome.current_price.source.to_string();
            view.current_price = Some(outcome.current_price);
            view.loading = false;
            view.error = None;
            view.last_updated = Some(Utc::now());
            view.is_live = is_live;
            view.phase = Phase::Settled(outcome.settlement);
            view.last_failure = outcome.failure;
        });
    }
}
