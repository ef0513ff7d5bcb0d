pub mod cache;
pub mod controller;
pub mod history;
pub mod http;
pub mod providers;
pub mod relay;
pub mod resolver;

pub use cache::{CacheBackend, CacheStore, FileBackend, MemoryBackend};
pub use controller::{AggregationController, DashboardView, Phase, Settlement};
pub use history::{HistorySource, RelayedCoinGeckoHistory};
pub use http::{HttpFetch, ReqwestFetcher};
pub use providers::PriceProvider;
pub use relay::{ProxyRaceFetcher, Relay};
pub use resolver::{Resolution, SourceChainResolver};
