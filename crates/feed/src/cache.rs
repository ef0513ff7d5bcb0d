//! Time-boxed local snapshot of the last successful aggregation.
//!
//! Caching is an optimization only: every read/write failure is logged and
//! swallowed here, never handed to the caller.

use coinwatch_common::{CacheEntry, CurrentPrice, FeedError, FeedResult, PricePoint};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// 고정 캐시 키
pub const DEFAULT_CACHE_KEY: &str = "coinwatch.price-cache";

/// Key/value storage holding opaque blobs.
pub trait CacheBackend: Send + Sync {
    fn read(&self, key: &str) -> FeedResult<Option<String>>;
    fn write(&self, key: &str, blob: &str) -> FeedResult<()>;
}

/// 프로세스 메모리 백엔드
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, key: &str) -> FeedResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| FeedError::Cache("memory backend poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, blob: &str) -> FeedResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| FeedError::Cache("memory backend poisoned".to_string()))?;
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// 디렉터리 안에 키마다 파일 하나 (`<key>.json`)
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl CacheBackend for FileBackend {
    fn read(&self, key: &str) -> FeedResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FeedError::Cache(format!("read {}: {}", key, e))),
        }
    }

    fn write(&self, key: &str, blob: &str) -> FeedResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| FeedError::Cache(format!("create {}: {}", self.dir.display(), e)))?;
        std::fs::write(self.path_for(key), blob)
            .map_err(|e| FeedError::Cache(format!("write {}: {}", key, e)))
    }
}

/// 캐시 저장소
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    key: String,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self::with_key(backend, DEFAULT_CACHE_KEY, ttl)
    }

    pub fn with_key(backend: Arc<dyn CacheBackend>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            key: key.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Most recent snapshot if younger than the TTL, otherwise `None`.
    pub fn load(&self) -> Option<CacheEntry> {
        self.load_at(now_ms())
    }

    pub fn load_at(&self, now_ms: i64) -> Option<CacheEntry> {
        let blob = match self.backend.read(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed: {}", e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&blob) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache entry {} is unreadable: {}", self.key, e);
                return None;
            }
        };

        let age_ms = now_ms.saturating_sub(entry.timestamp);
        if age_ms >= self.ttl.as_millis() as i64 {
            debug!("Cache entry is stale ({} ms old)", age_ms);
            return None;
        }

        Some(entry)
    }

    /// 새 스냅샷으로 덮어쓴다 (실패는 로그만 남김)
    pub fn save(&self, price_data: &[PricePoint], current_price: &CurrentPrice) {
        self.save_at(price_data, current_price, now_ms())
    }

    pub fn save_at(&self, price_data: &[PricePoint], current_price: &CurrentPrice, now_ms: i64) {
        let entry = CacheEntry {
            price_data: price_data.to_vec(),
            current_price: current_price.clone(),
            timestamp: now_ms,
        };

        let result = serde_json::to_string(&entry)
            .map_err(FeedError::from)
            .and_then(|blob| self.backend.write(&self.key, &blob));

        if let Err(e) = result {
            warn!("Cache write failed: {}", e);
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
