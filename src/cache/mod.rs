/// Detection result cache with a one-day time-to-live
///
/// Every run writes its verdict here, including "no ad" verdicts, so a video is
/// only sent to the model once per TTL window.

pub mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore};

use crate::detection::TimeRange;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Storage key holding every cached entry, keyed by video id
pub const CACHE_KEY: &str = "detection_cache";

/// Storage key holding the timestamp of the last full sweep
pub const LAST_CLEANUP_KEY: &str = "last_cleanup_time";

/// Default entry lifetime and sweep interval
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Cached verdict for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Ad exists in the video
    pub exist: bool,
    /// Advertised product names
    pub good_name: Vec<String>,
    /// Ad ranges in seconds
    #[serde(rename = "adTimeRanges")]
    pub ad_time_ranges: Vec<TimeRange>,
    /// Whether the verdict may be auto-skipped; absent in older entries
    #[serde(rename = "isDetectionConfident", default)]
    pub is_detection_confident: bool,
    /// Creation time, ms since the Unix epoch
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl CacheEntry {
    pub fn new(
        exist: bool,
        good_name: Vec<String>,
        ad_time_ranges: Vec<TimeRange>,
        is_detection_confident: bool,
        created_at: i64,
    ) -> Self {
        Self {
            exist,
            good_name,
            ad_time_ranges,
            is_detection_confident,
            created_at,
        }
    }

    /// Entry recording a confirmed ad-free video
    pub fn no_ad(created_at: i64) -> Self {
        Self::new(false, Vec::new(), Vec::new(), false, created_at)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub valid: usize,
    /// Serialized size of the whole cache in bytes
    pub size: usize,
    pub last_cleanup: i64,
    pub next_cleanup: i64,
}

/// Information about one cached video
#[derive(Debug, Clone)]
pub struct CachedVideoInfo {
    pub video_id: String,
    pub entry: CacheEntry,
    pub is_valid: bool,
    pub age_hours: i64,
}

/// Per-video TTL cache over a [`KeyValueStore`].
///
/// Storage failures are logged and treated as an empty cache; they never fail the caller.
#[derive(Clone)]
pub struct DetectionCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl DetectionCache {
    /// Create a cache with the system clock
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        now - entry.created_at > self.ttl_ms
    }

    /// Load the stored map as-is; `None` when the store could not be read
    async fn load_raw(&self) -> Option<Map<String, Value>> {
        let mut values = match self.store.get(&[CACHE_KEY]).await {
            Ok(values) => values,
            Err(e) => {
                warn!("Failed to read detection cache: {}", e);
                return None;
            }
        };

        match values.remove(CACHE_KEY) {
            Some(Value::Object(raw_entries)) => Some(raw_entries),
            _ => Some(Map::new()),
        }
    }

    /// Typed view of the cache; entries that fail to deserialize are skipped
    async fn load_all(&self) -> BTreeMap<String, CacheEntry> {
        let Some(raw_entries) = self.load_raw().await else {
            return BTreeMap::new();
        };

        raw_entries
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), Self::read_entry(key, value)?)))
            .collect()
    }

    /// Write the map back; keys this version cannot read are written unchanged
    async fn save_raw(&self, raw_entries: Map<String, Value>) {
        if let Err(e) = self
            .store
            .set(HashMap::from([(CACHE_KEY.to_string(), Value::Object(raw_entries))]))
            .await
        {
            warn!("Failed to write detection cache: {}", e);
        }
    }

    fn read_entry(key: &str, value: &Value) -> Option<CacheEntry> {
        match serde_json::from_value::<CacheEntry>(value.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    fn write_entry(key: &str, entry: &CacheEntry) -> Option<Value> {
        match serde_json::to_value(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn last_cleanup_time(&self) -> i64 {
        match self.store.get(&[LAST_CLEANUP_KEY]).await {
            Ok(values) => values
                .get(LAST_CLEANUP_KEY)
                .and_then(Value::as_i64)
                .unwrap_or(0),
            Err(e) => {
                warn!("Failed to read last cleanup time: {}", e);
                0
            }
        }
    }

    async fn set_last_cleanup_time(&self, timestamp: i64) {
        if let Err(e) = self
            .store
            .set(HashMap::from([(LAST_CLEANUP_KEY.to_string(), Value::from(timestamp))]))
            .await
        {
            warn!("Failed to record cleanup time: {}", e);
        }
    }

    /// Fetch the entry for a video; an expired entry is deleted on the spot
    pub async fn get(&self, video_id: &str) -> Option<CacheEntry> {
        let mut raw_entries = self.load_raw().await?;
        let now = self.now_ms();

        let Some(entry) = raw_entries
            .get(video_id)
            .and_then(|value| Self::read_entry(video_id, value))
        else {
            debug!("Cache miss for {}", video_id);
            return None;
        };

        if self.is_expired(&entry, now) {
            info!("⏰ Cache expired for {}", video_id);
            raw_entries.remove(video_id);
            self.save_raw(raw_entries).await;
            return None;
        }

        info!("📚 Cache hit for {}", video_id);
        Some(entry)
    }

    /// Replace the entry for a video
    pub async fn save(&self, video_id: &str, entry: CacheEntry) {
        let Some(mut raw_entries) = self.load_raw().await else {
            return;
        };
        let Some(value) = Self::write_entry(video_id, &entry) else {
            return;
        };

        raw_entries.insert(video_id.to_string(), value);
        self.save_raw(raw_entries).await;
        info!("💾 Saved detection result for {}", video_id);
    }

    /// Sync user-adjusted ranges back into an existing entry
    pub async fn update_ad_time_ranges(&self, video_id: &str, ranges: Vec<TimeRange>) {
        let Some(mut raw_entries) = self.load_raw().await else {
            return;
        };
        let now = self.now_ms();

        let Some(mut entry) = raw_entries
            .get(video_id)
            .and_then(|value| Self::read_entry(video_id, value))
        else {
            debug!("No cache entry for {}, skipping range update", video_id);
            return;
        };

        entry.exist = !ranges.is_empty();
        entry.ad_time_ranges = ranges;
        entry.created_at = now;

        let Some(value) = Self::write_entry(video_id, &entry) else {
            return;
        };
        raw_entries.insert(video_id.to_string(), value);
        self.save_raw(raw_entries).await;
        info!("💾 Synced adjusted ad ranges for {}", video_id);
    }

    /// Remove the entry for a video; returns whether one existed
    pub async fn delete(&self, video_id: &str) -> bool {
        let Some(mut raw_entries) = self.load_raw().await else {
            return false;
        };
        if raw_entries.remove(video_id).is_none() {
            return false;
        }

        self.save_raw(raw_entries).await;
        info!("🗑️ Deleted cache entry for {}", video_id);
        true
    }

    /// Drop every entry
    pub async fn clear_all(&self) {
        match self.store.remove(&[CACHE_KEY]).await {
            Ok(()) => info!("🧹 Cleared detection cache"),
            Err(e) => warn!("Failed to clear detection cache: {}", e),
        }
    }

    /// Sweep expired entries, at most once per TTL period.
    ///
    /// Returns the number of removed entries; 0 when the sweep was skipped.
    pub async fn clean_expired(&self) -> usize {
        let last_cleanup = self.last_cleanup_time().await;
        if self.now_ms() - last_cleanup <= self.ttl_ms {
            debug!("Last cache sweep was less than one TTL ago, skipping");
            return 0;
        }

        self.force_clean_expired().await
    }

    /// Sweep expired entries regardless of when the last sweep ran
    pub async fn force_clean_expired(&self) -> usize {
        let Some(mut raw_entries) = self.load_raw().await else {
            return 0;
        };
        let now = self.now_ms();
        let before = raw_entries.len();

        // Unreadable entries have no known age and are kept
        raw_entries.retain(|key, value| {
            Self::read_entry(key, value).map_or(true, |entry| !self.is_expired(&entry, now))
        });
        let cleaned_count = before - raw_entries.len();

        self.save_raw(raw_entries).await;
        self.set_last_cleanup_time(now).await;

        if cleaned_count > 0 {
            info!("🧹 Cleaned up {} expired cache entries", cleaned_count);
        } else {
            debug!("No expired cache entries to clean");
        }

        cleaned_count
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.load_all().await;
        let last_cleanup = self.last_cleanup_time().await;
        let now = self.now_ms();

        let expired = entries
            .values()
            .filter(|entry| self.is_expired(entry, now))
            .count();
        let size = serde_json::to_string(&entries).map(|s| s.len()).unwrap_or(0);

        CacheStats {
            total: entries.len(),
            expired,
            valid: entries.len() - expired,
            size,
            last_cleanup,
            next_cleanup: last_cleanup + self.ttl_ms,
        }
    }

    /// List cached videos, newest first
    pub async fn entries(&self) -> Vec<CachedVideoInfo> {
        let now = self.now_ms();
        let mut videos: Vec<CachedVideoInfo> = self
            .load_all()
            .await
            .into_iter()
            .map(|(video_id, entry)| CachedVideoInfo {
                is_valid: !self.is_expired(&entry, now),
                age_hours: (now - entry.created_at) / 3_600_000,
                video_id,
                entry,
            })
            .collect();

        videos.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
        videos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _keys: &[&str]) -> anyhow::Result<HashMap<String, Value>> {
            Err(anyhow!("storage unavailable"))
        }

        async fn set(&self, _items: HashMap<String, Value>) -> anyhow::Result<()> {
            Err(anyhow!("storage unavailable"))
        }

        async fn remove(&self, _keys: &[&str]) -> anyhow::Result<()> {
            Err(anyhow!("storage unavailable"))
        }
    }

    fn setup() -> (DetectionCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock(AtomicI64::new(1_700_000_000_000)));
        let cache = DetectionCache::with_clock(store.clone(), DEFAULT_TTL, clock.clone());
        (cache, store, clock)
    }

    fn sample_entry(created_at: i64) -> CacheEntry {
        CacheEntry::new(true, vec!["VPN".to_string()], vec![(30.0, 40.0)], true, created_at)
    }

    async fn stored_keys(store: &MemoryStore) -> Vec<String> {
        let values = store.get(&[CACHE_KEY]).await.unwrap();
        values
            .get(CACHE_KEY)
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let (cache, _, clock) = setup();
        let entry = sample_entry(cache.now_ms());

        cache.save("BV1abc", entry.clone()).await;
        clock.advance(DAY_MS - 1);
        assert_eq!(cache.get("BV1abc").await, Some(entry));
    }

    #[tokio::test]
    async fn test_expired_get_evicts_entry() {
        let (cache, store, clock) = setup();
        cache.save("BV1abc", sample_entry(cache.now_ms())).await;
        cache.save("BV1def", sample_entry(cache.now_ms() + DAY_MS)).await;

        clock.advance(DAY_MS + 1);
        assert_eq!(cache.get("BV1abc").await, None);
        assert_eq!(stored_keys(&store).await, vec!["BV1def".to_string()]);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_verdict() {
        let (cache, _, _) = setup();
        cache.save("BV1abc", sample_entry(cache.now_ms())).await;
        cache.save("BV1abc", CacheEntry::no_ad(cache.now_ms())).await;

        let entry = cache.get("BV1abc").await.unwrap();
        assert!(!entry.exist);
        assert!(entry.ad_time_ranges.is_empty());
    }

    #[tokio::test]
    async fn test_missing_confidence_field_defaults_to_false() {
        let (cache, store, _) = setup();
        let now = cache.now_ms();
        store
            .set(HashMap::from([(
                CACHE_KEY.to_string(),
                json!({"BV1old": {"exist": true, "good_name": [], "adTimeRanges": [[1.0, 2.0]], "createdAt": now}}),
            )]))
            .await
            .unwrap();

        let entry = cache.get("BV1old").await.unwrap();
        assert!(!entry.is_detection_confident);
        assert_eq!(entry.ad_time_ranges, vec![(1.0, 2.0)]);
    }

    #[tokio::test]
    async fn test_unreadable_entries_survive_writes() {
        let (cache, store, clock) = setup();
        let now = cache.now_ms();
        store
            .set(HashMap::from([(
                CACHE_KEY.to_string(),
                json!({"odd": {"exist": true, "good_name": [], "adTimeRanges": "x", "createdAt": now}}),
            )]))
            .await
            .unwrap();

        assert!(cache.get("odd").await.is_none());
        cache.save("BV1new", sample_entry(now)).await;
        assert_eq!(stored_keys(&store).await, vec!["BV1new".to_string(), "odd".to_string()]);

        cache.update_ad_time_ranges("BV1new", vec![(1.0, 2.0)]).await;
        clock.advance(2 * DAY_MS);
        assert_eq!(cache.force_clean_expired().await, 1);
        assert_eq!(stored_keys(&store).await, vec!["odd".to_string()]);
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_clean_expired_is_throttled() {
        let (cache, store, clock) = setup();
        let start = cache.now_ms();

        // First sweep runs because no sweep was ever recorded
        assert_eq!(cache.clean_expired().await, 0);

        cache.save("old", sample_entry(start - 2 * DAY_MS)).await;
        assert_eq!(cache.clean_expired().await, 0);
        assert_eq!(stored_keys(&store).await, vec!["old".to_string()]);

        assert_eq!(cache.force_clean_expired().await, 1);
        assert!(stored_keys(&store).await.is_empty());

        cache.save("older", sample_entry(start - 2 * DAY_MS)).await;
        clock.advance(DAY_MS + 1);
        assert_eq!(cache.clean_expired().await, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _, _) = setup();
        let now = cache.now_ms();
        cache.save("fresh", sample_entry(now)).await;
        cache.save("stale", sample_entry(now - 2 * DAY_MS)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.expired, 1);
        assert!(stats.size > 0);
        assert_eq!(stats.last_cleanup, 0);
        assert_eq!(stats.next_cleanup, DAY_MS);

        cache.force_clean_expired().await;
        let stats = cache.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.last_cleanup, now);
        assert_eq!(stats.next_cleanup, now + DAY_MS);
    }

    #[tokio::test]
    async fn test_update_ranges_and_delete() {
        let (cache, _, clock) = setup();
        cache.update_ad_time_ranges("missing", vec![(1.0, 2.0)]).await;
        assert!(cache.get("missing").await.is_none());

        cache.save("BV1abc", sample_entry(cache.now_ms())).await;
        clock.advance(1000);
        cache.update_ad_time_ranges("BV1abc", Vec::new()).await;

        let entry = cache.get("BV1abc").await.unwrap();
        assert!(!entry.exist);
        assert_eq!(entry.created_at, cache.now_ms());

        assert!(cache.delete("BV1abc").await);
        assert!(!cache.delete("BV1abc").await);
    }

    #[tokio::test]
    async fn test_entries_sorted_newest_first() {
        let (cache, _, _) = setup();
        let now = cache.now_ms();
        cache.save("a", sample_entry(now - 3_600_000)).await;
        cache.save("b", sample_entry(now)).await;

        let videos = cache.entries().await;
        assert_eq!(videos[0].video_id, "b");
        assert_eq!(videos[1].age_hours, 1);
        assert!(videos.iter().all(|v| v.is_valid));

        cache.clear_all().await;
        assert!(cache.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_empty() {
        let cache = DetectionCache::new(Arc::new(FailingStore), DEFAULT_TTL);
        cache.save("BV1abc", sample_entry(cache.now_ms())).await;
        assert!(cache.get("BV1abc").await.is_none());
        assert_eq!(cache.force_clean_expired().await, 0);
        assert_eq!(cache.stats().await.total, 0);
    }
}
