//! Per-participant last-known state: raw and corrected position, plus the
//! monotonically accumulating distance/time the leaderboard and response
//! rely on.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo;
use crate::storage::KeyValueStore;

/// Raw and corrected position for one participant, refreshed on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLocation {
    pub raw_lat: f64,
    pub raw_lng: f64,
    pub raw_alt: Option<f64>,
    pub raw_accuracy: Option<f64>,
    pub raw_speed: Option<f64>,
    pub raw_heading: Option<f64>,
    pub raw_time_sec: i64,
    pub corrected_lat: f64,
    pub corrected_lng: f64,
    pub corrected_alt: Option<f64>,
    pub distance_covered: f64,
    pub cumulative_time_sec: i64,
    pub last_updated_sec: i64,
}

pub fn location_key(event_id: i64, event_detail_id: i64, user_id: i64) -> String {
    format!("gps:{}:{}:{}", event_id, event_detail_id, user_id)
}

/// Builds the next `ParticipantLocation`, accumulating distance and time
/// against whatever was previously stored (if anything).
pub fn next_location(
    previous: Option<&ParticipantLocation>,
    raw_lat: f64,
    raw_lng: f64,
    raw_alt: Option<f64>,
    raw_accuracy: Option<f64>,
    raw_speed: Option<f64>,
    raw_heading: Option<f64>,
    raw_time_sec: i64,
    corrected_lat: f64,
    corrected_lng: f64,
    corrected_alt: Option<f64>,
    distance_from_start: Option<f64>,
) -> ParticipantLocation {
    let (distance_covered, cumulative_time_sec) = match previous {
        Some(prev) => {
            let step_distance = geo::distance(prev.corrected_lat, prev.corrected_lng, corrected_lat, corrected_lng);
            let step_time = (raw_time_sec - prev.raw_time_sec).max(0);
            (prev.distance_covered + step_distance, prev.cumulative_time_sec + step_time)
        }
        None => (distance_from_start.unwrap_or(0.0), 0),
    };

    ParticipantLocation {
        raw_lat,
        raw_lng,
        raw_alt,
        raw_accuracy,
        raw_speed,
        raw_heading,
        raw_time_sec,
        corrected_lat,
        corrected_lng,
        corrected_alt,
        distance_covered,
        cumulative_time_sec,
        last_updated_sec: raw_time_sec,
    }
}

pub fn read(
    store: &dyn KeyValueStore<String, ParticipantLocation>,
    event_id: i64,
    event_detail_id: i64,
    user_id: i64,
) -> Result<Option<ParticipantLocation>> {
    store.get(&location_key(event_id, event_detail_id, user_id))
}

pub fn write(
    store: &dyn KeyValueStore<String, ParticipantLocation>,
    event_id: i64,
    event_detail_id: i64,
    user_id: i64,
    location: ParticipantLocation,
    ttl_secs: u64,
) -> Result<()> {
    store.set(location_key(event_id, event_detail_id, user_id), location, ttl_secs)
}
