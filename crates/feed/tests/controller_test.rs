use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use coinwatch_common::config::{ControllerConfig, RetryConfig};
use coinwatch_common::fallback::FallbackTable;
use coinwatch_common::{
    Coin, CurrentPrice, FeedError, FeedResult, PricePoint, PriceSource, RawSample,
};
use coinwatch_feed::{
    AggregationController, CacheBackend, CacheStore, HistorySource, MemoryBackend, Phase,
    PriceProvider, Settlement, SourceChainResolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 호출 횟수를 세는 가짜 공급자
struct StubProvider {
    source: PriceSource,
    price: Option<u64>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StubProvider {
    fn new(source: PriceSource, price: Option<u64>) -> Self {
        Self {
            source,
            price,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PriceProvider for StubProvider {
    fn source(&self) -> PriceSource {
        self.source
    }

    async fn fetch_current(&self, _coin: &Coin, _timeout: Duration) -> FeedResult<CurrentPrice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.price {
            Some(price) => Ok(CurrentPrice {
                price,
                change_24h: Some(2.0),
                source: self.source,
            }),
            None => Err(FeedError::Status {
                status: 503,
                url: self.source.to_string(),
            }),
        }
    }
}

enum HistoryBehavior {
    Samples(Vec<RawSample>),
    Fail,
    Panic,
}

struct StubHistory {
    behavior: HistoryBehavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak_active: Arc<AtomicUsize>,
}

/// 취소되어도 진행 중 카운터를 되돌린다
struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubHistory {
    fn new(behavior: HistoryBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            peak_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl HistorySource for StubHistory {
    async fn fetch_history(
        &self,
        _coin: &Coin,
        _days: u32,
        _timeout: Duration,
    ) -> FeedResult<Vec<RawSample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(running, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);

        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            HistoryBehavior::Samples(samples) => Ok(samples.clone()),
            HistoryBehavior::Fail => Err(FeedError::AllRelaysFailed(vec!["all down".into()])),
            HistoryBehavior::Panic => panic!("chart payload exploded"),
        }
    }
}

fn ts(year: i32, month: u32, day: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .unwrap()
        .timestamp_millis()
}

fn sample_history() -> Vec<RawSample> {
    vec![
        RawSample::new(ts(2024, 1, 5), 43_000.0),
        RawSample::new(ts(2024, 1, 20), 43_400.0),
        RawSample::new(ts(2024, 2, 10), 52_000.0),
    ]
}

fn config() -> ControllerConfig {
    ControllerConfig {
        retry: RetryConfig::no_retry(),
        poll_interval: Duration::from_secs(60),
        ..ControllerConfig::default()
    }
}

struct Harness {
    controller: Arc<AggregationController>,
    backend: Arc<MemoryBackend>,
    price_calls: Vec<Arc<AtomicUsize>>,
    history_calls: Arc<AtomicUsize>,
    peak_history_calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new(providers: Vec<StubProvider>, history: StubHistory) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        Self::with_backend(providers, history, backend)
    }

    fn with_backend(
        providers: Vec<StubProvider>,
        history: StubHistory,
        backend: Arc<MemoryBackend>,
    ) -> Self {
        let config = config();
        let price_calls = providers.iter().map(|p| p.calls.clone()).collect();
        let history_calls = history.calls.clone();
        let peak_history_calls = history.peak_active.clone();

        let chain: Vec<Arc<dyn PriceProvider>> = providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn PriceProvider>)
            .collect();
        let resolver = SourceChainResolver::new(chain, config.retry.clone());
        let cache = CacheStore::new(backend.clone(), config.cache_ttl);

        Self {
            controller: Arc::new(AggregationController::new(
                config,
                resolver,
                Arc::new(history),
                cache,
            )),
            backend,
            price_calls,
            history_calls,
            peak_history_calls,
        }
    }

    fn cache(&self) -> CacheStore {
        CacheStore::new(self.backend.clone(), Duration::from_secs(60))
    }

    fn total_price_calls(&self) -> usize {
        self.price_calls.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }
}

#[tokio::test(start_paused = true)]
async fn test_live_cycle_merges_and_persists() -> Result<()> {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(52_500))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
    );

    assert!(harness.controller.refetch().await);
    let view = harness.controller.view();

    assert_eq!(view.phase, Phase::Settled(Settlement::Live));
    assert_eq!(
        view.price_data,
        vec![PricePoint::new("2024-01", 43_200), PricePoint::new("2024-02", 52_000)]
    );
    assert_eq!(view.current_price.as_ref().map(|p| p.price), Some(52_500));
    assert_eq!(view.data_source, "coincap");
    assert!(view.is_live);
    assert!(!view.loading);
    assert!(view.error.is_none());
    assert!(view.last_updated.is_some());
    assert!(view.last_failure.is_none());

    let cached = harness.cache().load().expect("snapshot persisted");
    assert_eq!(cached.price_data, view.price_data);
    assert_eq!(cached.current_price.price, 52_500);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_price_derived_from_history_when_providers_fail() {
    let harness = Harness::new(
        vec![
            StubProvider::new(PriceSource::Coincap, None),
            StubProvider::new(PriceSource::Binance, None),
            StubProvider::new(PriceSource::Kraken, None),
        ],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
    );

    harness.controller.refetch().await;
    let view = harness.controller.view();
    let price = view.current_price.clone().unwrap();

    assert_eq!(price.price, 52_000);
    assert_eq!(price.change_24h, None);
    assert_eq!(price.source, PriceSource::Coingecko);
    assert_eq!(view.phase, Phase::Settled(Settlement::Partial));
    assert_eq!(harness.total_price_calls(), 3);
    assert!(harness.cache().load().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_hung_provider_is_cut_off_by_timeout() {
    let harness = Harness::new(
        vec![
            StubProvider::new(PriceSource::Coincap, Some(1)).slow(Duration::from_secs(600)),
            StubProvider::new(PriceSource::Binance, Some(48_000)),
        ],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
    );

    let started = tokio::time::Instant::now();
    harness.controller.refetch().await;

    assert_eq!(harness.controller.view().data_source, "binance");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_total_failure_shows_fallback_without_error() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, None)],
        StubHistory::new(HistoryBehavior::Fail),
    );

    harness.controller.refetch().await;
    let view = harness.controller.view();
    let table = FallbackTable::bitcoin();

    assert_eq!(view.price_data, table.series());
    let price = view.current_price.clone().unwrap();
    assert_eq!(price.price, table.latest().unwrap().price);
    assert_eq!(price.source, PriceSource::Fallback);
    assert_eq!(view.data_source, "fallback");
    assert!(view.error.is_none());
    assert!(!view.is_live);
    assert!(!view.loading);
    assert_eq!(view.phase, Phase::Settled(Settlement::Fallback));
    assert!(view.last_failure.as_deref().unwrap().contains("all down"));
    assert!(harness.cache().load().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_history_failure_keeps_live_price() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Kraken, Some(61_000))],
        StubHistory::new(HistoryBehavior::Fail),
    );

    harness.controller.refetch().await;
    let view = harness.controller.view();

    assert_eq!(view.price_data, FallbackTable::bitcoin().series());
    assert_eq!(view.current_price.as_ref().map(|p| p.price), Some(61_000));
    assert_eq!(view.data_source, "kraken");
    assert!(view.is_live);
    assert_eq!(view.phase, Phase::Settled(Settlement::Partial));
    // 히스토리가 실패하면 캐시에 쓰지 않는다
    assert!(harness.cache().load().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cycle_degrades_to_fallback() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(50_000))],
        StubHistory::new(HistoryBehavior::Panic),
    );

    assert!(harness.controller.refetch().await);
    let view = harness.controller.view();

    assert_eq!(view.phase, Phase::Settled(Settlement::Fallback));
    assert_eq!(view.price_data, FallbackTable::bitcoin().series());
    assert!(view.error.is_none());
    assert!(view.last_failure.unwrap().starts_with("cycle aborted"));
    assert!(!harness.controller.is_fetching());
}

#[tokio::test(start_paused = true)]
async fn test_fresh_cache_hydrates_without_network() {
    let backend = Arc::new(MemoryBackend::new());
    let cached_series = vec![PricePoint::new("2024-05", 67_000)];
    let cached_price = CurrentPrice {
        price: 67_500,
        change_24h: Some(-1.0),
        source: PriceSource::Binance,
    };
    CacheStore::new(backend.clone(), Duration::from_secs(60)).save(&cached_series, &cached_price);

    let harness = Harness::with_backend(
        vec![StubProvider::new(PriceSource::Coincap, Some(1))],
        StubHistory::new(HistoryBehavior::Fail),
        backend,
    );

    assert!(harness.controller.hydrate());
    let view = harness.controller.view();

    assert_eq!(view.phase, Phase::CacheHydrated);
    assert_eq!(view.price_data, cached_series);
    assert_eq!(view.current_price, Some(cached_price));
    assert_eq!(view.data_source, "cache");
    assert!(!view.is_live);
    assert!(!view.loading);
    assert_eq!(harness.total_price_calls(), 0);
    assert_eq!(harness.history_calls.load(Ordering::SeqCst), 0);

    // 두 번째 hydrate는 아무 일도 하지 않는다
    assert!(!harness.controller.hydrate());
}

#[tokio::test(start_paused = true)]
async fn test_stale_cache_is_ignored() {
    let backend = Arc::new(MemoryBackend::new());
    let stale = CacheStore::new(backend.clone(), Duration::from_secs(60));
    let old = Utc::now().timestamp_millis() - 61_000;
    stale.save_at(
        &[PricePoint::new("2024-05", 67_000)],
        &CurrentPrice {
            price: 67_500,
            change_24h: None,
            source: PriceSource::Binance,
        },
        old,
    );

    let harness = Harness::with_backend(
        vec![StubProvider::new(PriceSource::Coincap, Some(1))],
        StubHistory::new(HistoryBehavior::Fail),
        backend.clone(),
    );

    assert!(!harness.controller.hydrate());
    assert_eq!(harness.controller.view().phase, Phase::Uninitialized);
    // 만료됐어도 저장소에는 남아 있다
    assert!(backend.read("coinwatch.price-cache").unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_refetch_during_cycle_is_ignored() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(50_000)).slow(Duration::from_secs(3))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())).slow(Duration::from_secs(4)),
    );

    let controller = harness.controller.clone();
    let first = tokio::spawn(async move { controller.refetch().await });

    while !harness.controller.is_fetching() {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.controller.view().phase, Phase::Fetching);

    assert!(!harness.controller.refetch().await);
    assert!(!harness.controller.refetch().await);

    assert!(first.await.unwrap());
    assert_eq!(harness.total_price_calls(), 1);
    assert_eq!(harness.history_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.controller.cycles_completed(), 1);

    // 끝난 뒤에는 다시 실행된다
    assert!(harness.controller.refetch().await);
    assert_eq!(harness.total_price_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_mount_fetches_then_polls() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(50_000))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
    );

    harness.controller.mount();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.controller.cycles_completed(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.controller.cycles_completed(), 2);

    harness.controller.unmount();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.controller.cycles_completed(), 2);
    assert_eq!(harness.history_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_mid_cycle_stops_the_worker() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(50_000)).slow(Duration::from_secs(4))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())).slow(Duration::from_secs(4)),
    );

    harness.controller.mount();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(harness.controller.is_fetching());

    harness.controller.unmount();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!harness.controller.is_fetching());

    // 새 사이클은 이전 작업과 겹치지 않는다
    assert!(harness.controller.refetch().await);
    assert_eq!(harness.history_calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.total_price_calls(), 2);
    assert_eq!(harness.peak_history_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.controller.cycles_completed(), 1);
    assert_eq!(harness.controller.view().phase, Phase::Settled(Settlement::Live));
}

#[tokio::test(start_paused = true)]
async fn test_mount_with_fresh_cache_defers_first_cycle() {
    let backend = Arc::new(MemoryBackend::new());
    CacheStore::new(backend.clone(), Duration::from_secs(60)).save(
        &[PricePoint::new("2024-05", 67_000)],
        &CurrentPrice {
            price: 67_500,
            change_24h: None,
            source: PriceSource::Binance,
        },
    );

    let harness = Harness::with_backend(
        vec![StubProvider::new(PriceSource::Coincap, Some(70_000))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
        backend,
    );

    harness.controller.mount();
    assert_eq!(harness.controller.view().phase, Phase::CacheHydrated);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.total_price_calls(), 0);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(harness.total_price_calls(), 1);
    assert_eq!(harness.controller.view().data_source, "coincap");

    harness.controller.unmount();
}

#[tokio::test(start_paused = true)]
async fn test_controllers_do_not_share_state() {
    let slow = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(1)).slow(Duration::from_secs(4))],
        StubHistory::new(HistoryBehavior::Fail),
    );
    let fast = Harness::new(
        vec![StubProvider::new(PriceSource::Binance, Some(2))],
        StubHistory::new(HistoryBehavior::Fail),
    );

    let controller = slow.controller.clone();
    let pending = tokio::spawn(async move { controller.refetch().await });
    while !slow.controller.is_fetching() {
        tokio::task::yield_now().await;
    }

    // 다른 인스턴스의 가드는 영향이 없다
    assert!(fast.controller.refetch().await);
    assert_eq!(fast.controller.view().data_source, "binance");

    assert!(pending.await.unwrap());
    assert_eq!(slow.controller.view().data_source, "coincap");
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_settled_view() {
    let harness = Harness::new(
        vec![StubProvider::new(PriceSource::Coincap, Some(50_000))],
        StubHistory::new(HistoryBehavior::Samples(sample_history())),
    );
    let mut updates = harness.controller.subscribe();

    harness.controller.refetch().await;

    assert!(updates.has_changed().unwrap());
    let view = updates.borrow_and_update().clone();
    assert_eq!(view.phase, Phase::Settled(Settlement::Live));
}
