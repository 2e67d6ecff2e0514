//! Live ranking per event detail: furthest checkpoint reached first, then
//! lowest cumulative time.

use crate::config::LeaderboardConfig;
use crate::error::Result;
use crate::storage::OrderedSetStore;

/// Composite score: `checkpoint_index * bucket_size + cumulative_time_sec`.
/// Ascending, lower is better — further progress always outranks a faster
/// time at an earlier checkpoint because `bucket_size` dwarfs any plausible
/// cumulative time.
pub fn composite_score(checkpoint_index: u32, cumulative_time_sec: i64, config: &LeaderboardConfig) -> i64 {
    checkpoint_index as i64 * config.index_bucket_size + cumulative_time_sec
}

pub fn leaderboard_key(event_id: i64, event_detail_id: i64) -> String {
    format!("leaderboard:{}:{}", event_id, event_detail_id)
}

/// Updates a participant's leaderboard entry.
pub fn update(
    store: &dyn OrderedSetStore<String, i64>,
    event_id: i64,
    event_detail_id: i64,
    user_id: i64,
    checkpoint_index: u32,
    cumulative_time_sec: i64,
    config: &LeaderboardConfig,
) -> Result<()> {
    let score = composite_score(checkpoint_index, cumulative_time_sec, config);
    store.upsert(&leaderboard_key(event_id, event_detail_id), user_id, score, config.ttl_secs)
}

pub fn top_n(
    store: &dyn OrderedSetStore<String, i64>,
    event_id: i64,
    event_detail_id: i64,
    n: usize,
) -> Result<Vec<(i64, i64)>> {
    store.top_n(&leaderboard_key(event_id, event_detail_id), n)
}

pub fn rank(
    store: &dyn OrderedSetStore<String, i64>,
    event_id: i64,
    event_detail_id: i64,
    user_id: i64,
) -> Result<Option<usize>> {
    store.rank(&leaderboard_key(event_id, event_detail_id), &user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryOrderedSetStore;

    #[test]
    fn test_further_checkpoint_always_outranks_faster_earlier_time() {
        let config = LeaderboardConfig::default();
        let store: MemoryOrderedSetStore<String, i64> = MemoryOrderedSetStore::new();

        update(&store, 1, 1, 100, 5, 50, &config).unwrap(); // far but slow start
        update(&store, 1, 1, 200, 1, 1, &config).unwrap(); // near but extremely fast

        let top = top_n(&store, 1, 1, 10).unwrap();
        assert_eq!(top[0].0, 100);
    }

    #[test]
    fn test_equal_checkpoint_orders_by_time() {
        let config = LeaderboardConfig::default();
        let store: MemoryOrderedSetStore<String, i64> = MemoryOrderedSetStore::new();

        update(&store, 1, 1, 100, 2, 500, &config).unwrap();
        update(&store, 1, 1, 200, 2, 300, &config).unwrap();

        let top = top_n(&store, 1, 1, 10).unwrap();
        assert_eq!(top[0].0, 200);
        assert_eq!(top[1].0, 100);
    }

    #[test]
    fn test_update_overwrites_previous_score() {
        let config = LeaderboardConfig::default();
        let store: MemoryOrderedSetStore<String, i64> = MemoryOrderedSetStore::new();

        update(&store, 1, 1, 100, 1, 500, &config).unwrap();
        update(&store, 1, 1, 100, 3, 10, &config).unwrap();

        assert_eq!(rank(&store, 1, 1, 100).unwrap(), Some(1));
    }
}
