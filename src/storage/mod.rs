//! Abstract external-store interfaces the pipeline depends on: a key-value
//! store with TTLs and per-field writes, and an ordered set for the
//! leaderboard. A real deployment may back both with the same system.
//! `memory` provides an in-memory implementation of both, suitable for a
//! single process and for tests; production deployments would implement
//! these traits against whatever store they already run.

pub mod memory;

use crate::error::Result;

/// A TTL-aware key/hash-field store.
///
/// `Key` is left generic over anything `Eq + Hash + Clone`; callers
/// construct their own composite keys (see `pipeline.rs`).
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>>;
    fn set(&self, key: K, value: V, ttl_secs: u64) -> Result<()>;
    fn delete(&self, key: &K) -> Result<()>;
}

/// An ordered set keyed by a composite score, ascending (lower is better).
pub trait OrderedSetStore<K, M>: Send + Sync {
    /// Inserts or overwrites `member`'s score within the set named by `key`.
    fn upsert(&self, key: &K, member: M, score: i64, ttl_secs: u64) -> Result<()>;
    /// Returns up to `n` members in ascending score order.
    fn top_n(&self, key: &K, n: usize) -> Result<Vec<(M, i64)>>;
    /// 1-based rank of `member` within the set, if present.
    fn rank(&self, key: &K, member: &M) -> Result<Option<usize>>;
}
