//! In-memory implementations of the storage traits, plus the per-key lock
//! registry that gives the pipeline its per-participant write serialization.
//!
//! Entries evict lazily: each slot carries an `Instant` deadline and is
//! dropped the next time its key is read past that point, rather than being
//! swept by a background task or a capacity-triggered eviction policy.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{CoreError, Result};
use crate::storage::{KeyValueStore, OrderedSetStore};

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory key/value store with per-entry TTL.
pub struct MemoryKeyValueStore<K, V> {
    entries: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> MemoryKeyValueStore<K, V> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for MemoryKeyValueStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyValueStore<K, V> for MemoryKeyValueStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        let guard = self.entries.lock().map_err(|_| CoreError::internal("kv store lock poisoned"))?;
        match guard.get(key) {
            Some(slot) if slot.expires_at >= Instant::now() => Ok(Some(slot.value.clone())),
            _ => Ok(None),
        }
    }

    fn set(&self, key: K, value: V, ttl_secs: u64) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| CoreError::internal("kv store lock poisoned"))?;
        guard.insert(key, Slot { value, expires_at: Instant::now() + Duration::from_secs(ttl_secs) });
        Ok(())
    }

    fn delete(&self, key: &K) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| CoreError::internal("kv store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}

struct SetSlot<M> {
    scores: HashMap<M, i64>,
    expires_at: Instant,
}

/// In-memory ordered-set store, one `HashMap<member, score>` per key,
/// re-sorted on read. Fine at leaderboard scale (hundreds to low thousands
/// of participants per event detail).
pub struct MemoryOrderedSetStore<K, M> {
    sets: Mutex<HashMap<K, SetSlot<M>>>,
}

impl<K: Eq + Hash + Clone, M: Eq + Hash + Clone> MemoryOrderedSetStore<K, M> {
    pub fn new() -> Self {
        Self { sets: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, M: Eq + Hash + Clone> Default for MemoryOrderedSetStore<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, M> OrderedSetStore<K, M> for MemoryOrderedSetStore<K, M>
where
    K: Eq + Hash + Clone + Send + Sync,
    M: Eq + Hash + Clone + Send + Sync,
{
    fn upsert(&self, key: &K, member: M, score: i64, ttl_secs: u64) -> Result<()> {
        let mut guard = self.sets.lock().map_err(|_| CoreError::internal("ordered set lock poisoned"))?;
        let slot = guard.entry(key.clone()).or_insert_with(|| SetSlot {
            scores: HashMap::new(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        });
        slot.scores.insert(member, score);
        slot.expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        Ok(())
    }

    fn top_n(&self, key: &K, n: usize) -> Result<Vec<(M, i64)>> {
        let guard = self.sets.lock().map_err(|_| CoreError::internal("ordered set lock poisoned"))?;
        let Some(slot) = guard.get(key) else { return Ok(Vec::new()) };
        if slot.expires_at < Instant::now() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<(M, i64)> = slot.scores.iter().map(|(m, s)| (m.clone(), *s)).collect();
        entries.sort_by_key(|(_, score)| *score);
        entries.truncate(n);
        Ok(entries)
    }

    fn rank(&self, key: &K, member: &M) -> Result<Option<usize>> {
        let guard = self.sets.lock().map_err(|_| CoreError::internal("ordered set lock poisoned"))?;
        let Some(slot) = guard.get(key) else { return Ok(None) };
        if slot.expires_at < Instant::now() {
            return Ok(None);
        }
        let Some(&target_score) = slot.scores.get(member) else { return Ok(None) };
        let better = slot.scores.values().filter(|&&s| s < target_score).count();
        Ok(Some(better + 1))
    }
}

/// Lazily-created per-key async mutexes, used to serialize writes for the
/// same `(user_id, event_detail_id)` without taking one global lock that
/// would serialize unrelated participants against each other.
pub struct KeyLocks<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Returns the (possibly freshly created) lock for `key`.
    pub fn get(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.locks.lock().expect("key lock registry poisoned");
        guard.entry(key.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_round_trip() {
        let store: MemoryKeyValueStore<String, i32> = MemoryKeyValueStore::new();
        store.set("a".to_string(), 1, 3600).unwrap();
        assert_eq!(store.get(&"a".to_string()).unwrap(), Some(1));
    }

    #[test]
    fn test_kv_delete() {
        let store: MemoryKeyValueStore<String, i32> = MemoryKeyValueStore::new();
        store.set("a".to_string(), 1, 3600).unwrap();
        store.delete(&"a".to_string()).unwrap();
        assert_eq!(store.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn test_kv_expiry() {
        let store: MemoryKeyValueStore<String, i32> = MemoryKeyValueStore::new();
        store.set("a".to_string(), 1, 0).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn test_ordered_set_ascending() {
        let store: MemoryOrderedSetStore<String, String> = MemoryOrderedSetStore::new();
        let key = "event:1".to_string();
        store.upsert(&key, "alice".to_string(), 100, 3600).unwrap();
        store.upsert(&key, "bob".to_string(), 50, 3600).unwrap();
        let top = store.top_n(&key, 10).unwrap();
        assert_eq!(top[0].0, "bob");
        assert_eq!(top[1].0, "alice");
    }

    #[test]
    fn test_ordered_set_rank() {
        let store: MemoryOrderedSetStore<String, String> = MemoryOrderedSetStore::new();
        let key = "event:1".to_string();
        store.upsert(&key, "alice".to_string(), 100, 3600).unwrap();
        store.upsert(&key, "bob".to_string(), 50, 3600).unwrap();
        assert_eq!(store.rank(&key, &"bob".to_string()).unwrap(), Some(1));
        assert_eq!(store.rank(&key, &"alice".to_string()).unwrap(), Some(2));
    }

    #[test]
    fn test_overwrite_by_key() {
        let store: MemoryOrderedSetStore<String, String> = MemoryOrderedSetStore::new();
        let key = "event:1".to_string();
        store.upsert(&key, "alice".to_string(), 100, 3600).unwrap();
        store.upsert(&key, "alice".to_string(), 10, 3600).unwrap();
        assert_eq!(store.rank(&key, &"alice".to_string()).unwrap(), Some(1));
    }

    #[test]
    fn test_key_locks_same_key_returns_same_arc() {
        let locks: KeyLocks<String> = KeyLocks::new();
        let a = locks.get(&"x".to_string());
        let b = locks.get(&"x".to_string());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
