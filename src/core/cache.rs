// src/core/cache.rs

//! # Cache Manager
//!
//! A process-wide keyed store mapping (entity type, fingerprint) to a
//! normalized result payload. The manager owns the entry table exclusively;
//! every other component goes through `get`/`set`/`invalidate`. Policy
//! (whether a given operation is cached at all) belongs to the pipeline —
//! this module only enforces TTLs and cascades.

use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::constants::{
    DEFAULT_ANALYSIS_TTL_SECS, DEFAULT_FOLDER_TTL_SECS, DEFAULT_PERSPECTIVE_TTL_SECS,
    DEFAULT_PROJECT_TTL_SECS, DEFAULT_TAG_TTL_SECS, DEFAULT_TASK_TTL_SECS,
};
use crate::models::{EntityType, InvalidationSignal};

/// Per-entity-type TTLs, fixed at construction time.
#[derive(Debug, Clone)]
pub struct TtlTable {
    ttls: HashMap<EntityType, Duration>,
}

impl TtlTable {
    pub fn new(ttls: HashMap<EntityType, Duration>) -> Self {
        Self { ttls }
    }

    pub fn get(&self, entity: EntityType) -> Duration {
        self.ttls
            .get(&entity)
            .copied()
            .unwrap_or(Duration::from_secs(DEFAULT_TASK_TTL_SECS))
    }
}

impl Default for TtlTable {
    fn default() -> Self {
        let mut ttls = HashMap::new();
        ttls.insert(EntityType::Task, Duration::from_secs(DEFAULT_TASK_TTL_SECS));
        ttls.insert(
            EntityType::Project,
            Duration::from_secs(DEFAULT_PROJECT_TTL_SECS),
        );
        ttls.insert(EntityType::Tag, Duration::from_secs(DEFAULT_TAG_TTL_SECS));
        ttls.insert(
            EntityType::Folder,
            Duration::from_secs(DEFAULT_FOLDER_TTL_SECS),
        );
        ttls.insert(
            EntityType::Perspective,
            Duration::from_secs(DEFAULT_PERSPECTIVE_TTL_SECS),
        );
        ttls.insert(
            EntityType::Analysis,
            Duration::from_secs(DEFAULT_ANALYSIS_TTL_SECS),
        );
        Self { ttls }
    }
}

/// One cached payload. Entries are replaced wholesale, never mutated.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    inserted_at: Instant,
}

/// The process-wide result cache. Constructed once, injected everywhere;
/// tests build their own with whatever TTLs they need.
#[derive(Debug)]
pub struct CacheManager {
    ttls: TtlTable,
    enabled: bool,
    buckets: RwLock<HashMap<EntityType, HashMap<String, CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    pub fn new(ttls: TtlTable, enabled: bool) -> Self {
        let buckets = EntityType::ALL
            .iter()
            .map(|entity| (*entity, HashMap::new()))
            .collect();
        Self {
            ttls,
            enabled,
            buckets: RwLock::new(buckets),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up a fingerprint. An entry past its TTL is a miss; it is
    /// evicted lazily on the next access rather than by a sweeper.
    pub fn get(&self, entity: EntityType, fingerprint: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let expired = {
            let buckets = read_lock(&self.buckets);
            match buckets.get(&entity).and_then(|b| b.get(fingerprint)) {
                Some(entry) => {
                    if entry.inserted_at.elapsed() < self.ttls.get(entity) {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        debug!("Cache HIT for {entity} fingerprint {fingerprint}.");
                        return Some(entry.payload.clone());
                    }
                    true
                }
                None => false,
            }
        };
        if expired {
            let mut buckets = write_lock(&self.buckets);
            if let Some(bucket) = buckets.get_mut(&entity) {
                bucket.remove(fingerprint);
            }
            debug!("Cache entry for {entity} fingerprint {fingerprint} expired.");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache MISS for {entity} fingerprint {fingerprint}.");
        None
    }

    pub fn set(&self, entity: EntityType, fingerprint: String, payload: Value) {
        if !self.enabled {
            return;
        }
        let mut buckets = write_lock(&self.buckets);
        buckets.entry(entity).or_default().insert(
            fingerprint,
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Clears every bucket in the signal's cascade set. Runs synchronously:
    /// by the time this returns, the next read anywhere in the process sees
    /// the invalidation. Returns the number of entries dropped.
    pub fn invalidate(&self, signal: &InvalidationSignal) -> usize {
        let mut dropped = 0;
        let mut buckets = write_lock(&self.buckets);
        for entity in signal.cascade() {
            if let Some(bucket) = buckets.get_mut(entity) {
                dropped += bucket.len();
                bucket.clear();
            }
        }
        debug!(
            "Invalidated {} cached entries for {} mutation (ids: {:?}).",
            dropped, signal.entity, signal.affected_ids
        );
        dropped
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

// A poisoned lock means a writer panicked mid-update; the table is still
// structurally sound (entries are replaced wholesale), so recover the guard
// instead of propagating the panic into every caller.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::thread::sleep;

    fn table_with(entity: EntityType, ttl: Duration) -> TtlTable {
        let mut ttls = HashMap::new();
        ttls.insert(entity, ttl);
        TtlTable::new(ttls)
    }

    #[test]
    fn test_get_returns_fresh_entry() {
        let cache = CacheManager::new(TtlTable::default(), true);
        cache.set(EntityType::Task, "fp1".to_string(), json!([1, 2]));
        assert_eq!(cache.get(EntityType::Task, "fp1"), Some(json!([1, 2])));
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_entry_past_ttl_is_a_miss_and_evicted() {
        let cache = CacheManager::new(
            table_with(EntityType::Task, Duration::from_millis(10)),
            true,
        );
        cache.set(EntityType::Task, "fp1".to_string(), json!("payload"));
        sleep(Duration::from_millis(25));
        assert_eq!(cache.get(EntityType::Task, "fp1"), None);
        // Evicted, not merely skipped: a second read is still a miss and the
        // bucket no longer holds the entry.
        assert_eq!(cache.get(EntityType::Task, "fp1"), None);
        assert_eq!(cache.miss_count(), 2);
    }

    #[test]
    fn test_entry_before_ttl_is_a_hit() {
        let cache = CacheManager::new(
            table_with(EntityType::Task, Duration::from_secs(60)),
            true,
        );
        cache.set(EntityType::Task, "fp1".to_string(), json!(1));
        assert_eq!(cache.get(EntityType::Task, "fp1"), Some(json!(1)));
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = CacheManager::new(TtlTable::default(), false);
        cache.set(EntityType::Task, "fp1".to_string(), json!(1));
        assert_eq!(cache.get(EntityType::Task, "fp1"), None);
    }

    #[test]
    fn test_task_invalidation_cascades_to_project_and_analysis() {
        let cache = CacheManager::new(TtlTable::default(), true);
        cache.set(EntityType::Task, "t".to_string(), json!(1));
        cache.set(EntityType::Project, "p".to_string(), json!(2));
        cache.set(EntityType::Analysis, "a".to_string(), json!(3));
        cache.set(EntityType::Folder, "f".to_string(), json!(4));

        let dropped = cache.invalidate(&InvalidationSignal::new(
            EntityType::Task,
            vec!["t1".to_string()],
        ));

        assert_eq!(dropped, 3);
        assert_eq!(cache.get(EntityType::Task, "t"), None);
        assert_eq!(cache.get(EntityType::Project, "p"), None);
        assert_eq!(cache.get(EntityType::Analysis, "a"), None);
        // Folders are outside the task cascade.
        assert_eq!(cache.get(EntityType::Folder, "f"), Some(json!(4)));
    }

    #[test]
    fn test_tag_invalidation_clears_tag_and_task_queries() {
        let cache = CacheManager::new(TtlTable::default(), true);
        cache.set(EntityType::Tag, "g".to_string(), json!(1));
        cache.set(EntityType::Task, "t".to_string(), json!(2));
        cache.invalidate(&InvalidationSignal::new(EntityType::Tag, vec![]));
        assert_eq!(cache.get(EntityType::Tag, "g"), None);
        assert_eq!(cache.get(EntityType::Task, "t"), None);
    }

    #[test]
    fn test_set_replaces_entry_wholesale() {
        let cache = CacheManager::new(TtlTable::default(), true);
        cache.set(EntityType::Task, "fp".to_string(), json!("old"));
        cache.set(EntityType::Task, "fp".to_string(), json!("new"));
        assert_eq!(cache.get(EntityType::Task, "fp"), Some(json!("new")));
    }
}
