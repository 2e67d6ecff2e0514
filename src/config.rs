//! Tunable defaults for every subsystem, gathered in one place.
//!
//! One struct per subsystem, plain fields, a `Default` impl carrying the
//! production-tuned numbers.

use serde::{Deserialize, Serialize};

/// Route densification and checkpoint spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Maximum distance between consecutive route points after densification (meters).
    pub spacing_m: f64,
    /// Distance between generated checkpoints along the course (meters).
    pub checkpoint_spacing_m: f64,
    /// Reject GPX files larger than this many bytes.
    pub max_gpx_bytes: usize,
    /// Reject routes shorter than this total distance (meters).
    pub min_route_distance_m: f64,
    /// TTL for stored routes.
    pub ttl_secs: u64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            spacing_m: 100.0,
            checkpoint_spacing_m: 1000.0,
            max_gpx_bytes: 10 * 1024 * 1024, // 10 MB
            min_route_distance_m: 10.0,
            ttl_secs: 24 * 3600,
        }
    }
}

/// Map-matching thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// A sample beyond this distance from the route is considered unmatched (meters).
    pub match_threshold_m: f64,
    /// Weight applied to heading misalignment when scoring candidate segments (m/degree).
    pub bearing_weight: f64,
    /// Number of nearest route points to pull from the R-tree before scoring segments.
    pub candidate_window: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_threshold_m: 50.0,
            bearing_weight: 0.05,
            candidate_window: 8,
        }
    }
}

/// Checkpoint crossing detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Radius within which a sample counts as "at" a checkpoint (meters).
    pub radius_m: f64,
    /// Reject segment durations longer than this as implausible (seconds).
    pub max_plausible_duration_secs: i64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            radius_m: 30.0,
            max_plausible_duration_secs: 24 * 3600,
        }
    }
}

/// Kalman filter process/measurement noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanConfig {
    /// Process noise for lat/lng (degrees^2 per step).
    pub process_noise_latlng: f64,
    /// Process noise for altitude (m^2 per step).
    pub process_noise_alt: f64,
    /// Base measurement noise before confidence weighting.
    pub base_measurement_noise: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise_latlng: 1e-6,
            process_noise_alt: 0.1,
            base_measurement_noise: 5.0,
        }
    }
}

/// Leaderboard scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Multiplier separating checkpoint-index buckets in the composite score.
    pub index_bucket_size: i64,
    /// TTL for a leaderboard's ordered set.
    pub ttl_secs: u64,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            index_bucket_size: 360_000, // 100h in seconds; comfortably larger than any plausible split time
            ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// External store access (timeouts, TTLs not covered above).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Timeout applied to every external store call (milliseconds).
    pub call_timeout_ms: u64,
    /// TTL for participant location / previous-position state.
    pub participant_state_ttl_secs: u64,
    /// Fallback event start offset when none is supplied, relative to now (seconds).
    pub fallback_event_start_offset_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 200,
            participant_state_ttl_secs: 24 * 3600,
            fallback_event_start_offset_secs: -12 * 3600,
        }
    }
}

/// Aggregate configuration for the whole correction pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub route: RouteConfig,
    pub matching: MatchConfig,
    pub checkpoint: CheckpointConfig,
    pub kalman: KalmanConfig,
    pub leaderboard: LeaderboardConfig,
    pub store: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.route.spacing_m, 100.0);
        assert_eq!(cfg.route.checkpoint_spacing_m, 1000.0);
        assert_eq!(cfg.matching.match_threshold_m, 50.0);
        assert_eq!(cfg.checkpoint.radius_m, 30.0);
        assert_eq!(cfg.leaderboard.index_bucket_size, 360_000);
        assert_eq!(cfg.store.call_timeout_ms, 200);
    }
}
