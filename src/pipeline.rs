//! Orchestrates one correction call: Kalman filter -> map match -> checkpoint
//! detection -> segment timing -> leaderboard + location writes.
//!
//! Log lines carry a bracketed `[CorrectionPipeline]` tag for grepability.
//! Every external store call is wrapped in `tokio::time::timeout` so a slow
//! or unreachable store degrades the response instead of hanging the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::checkpoint::{self, PreviousPosition};
use crate::config::PipelineConfig;
use crate::error::{CoreError, Result};
use crate::kalman::{derive_confidence, KalmanFilter3D};
use crate::leaderboard;
use crate::location::{self, ParticipantLocation};
use crate::matcher::{self, MatchResult};
use crate::route::RouteStore;
use crate::segment_timer;
use crate::storage::memory::{KeyLocks, MemoryKeyValueStore, MemoryOrderedSetStore};

/// One GPS sample in a correction request's batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsSample {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    pub timestamp: TimestampValue,
}

/// A timestamp as received from the client: Unix seconds, Unix
/// milliseconds, or an ISO 8601 string all accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Numeric(i64),
    Text(String),
}

/// Parses a sample timestamp into Unix seconds. Falls back to `now` and
/// logs a warning on failure rather than failing the whole batch.
pub fn parse_timestamp(value: &TimestampValue, now_sec: i64) -> i64 {
    match value {
        TimestampValue::Numeric(n) => {
            if n.abs() > 100_000_000_000 {
                n / 1000 // milliseconds
            } else {
                *n
            }
        }
        TimestampValue::Text(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => dt.timestamp(),
            Err(_) => match s.parse::<i64>() {
                Ok(n) if n.abs() > 100_000_000_000 => n / 1000,
                Ok(n) => n,
                Err(_) => {
                    log::warn!("[CorrectionPipeline] could not parse timestamp '{}', using wall clock", s);
                    now_sec
                }
            },
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRequest {
    pub user_id: i64,
    pub event_id: i64,
    pub event_detail_id: i64,
    pub gps_data: Vec<GpsSample>,
    /// Official event start time, if known. Falls back to a configured
    /// offset from now when absent (see `StoreConfig`).
    #[serde(default)]
    pub event_start_time_sec: Option<i64>,
}

impl CorrectionRequest {
    /// Parses a request from the wire JSON shape described in the
    /// correction endpoint's external interface.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| CoreError::invalid_input(format!("malformed correction request: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointReach {
    pub checkpoint_id: String,
    pub checkpoint_index: u32,
    pub pass_time: i64,
    pub segment_duration_sec: Option<i64>,
    pub cumulative_duration_sec: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestRoutePoint {
    pub lat: f64,
    pub lng: f64,
    pub distance_to_point: f64,
    pub distance_from_start: f64,
    pub route_progress: f64,
    pub route_bearing: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingQuality {
    pub matched: bool,
    pub match_score: f64,
    pub bearing_difference: Option<f64>,
    pub gps_confidence: Option<f64>,
    pub correction_strength: f64,
    pub quality_grade: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResponse {
    pub user_id: i64,
    pub event_id: i64,
    pub event_detail_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub timestamp: i64,
    pub checkpoint_reaches: Vec<CheckpointReach>,
    pub nearest_route_point: Option<NearestRoutePoint>,
    pub matching_quality: MatchingQuality,
}

impl CorrectionResponse {
    /// Serializes the response to the wire JSON shape, falling back to an
    /// empty object on an encoding failure rather than panicking.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Everything the pipeline reads and writes, wired together behind the
/// abstract storage traits.
pub struct CorrectionPipeline {
    pub config: PipelineConfig,
    pub routes: Arc<RouteStore>,
    locations: MemoryKeyValueStore<String, ParticipantLocation>,
    previous_positions: MemoryKeyValueStore<String, PreviousPosition>,
    checkpoint_pass_times: MemoryKeyValueStore<String, HashMap<String, i64>>,
    segment_records: MemoryKeyValueStore<String, HashMap<String, (Option<i64>, Option<i64>)>>,
    leaderboards: MemoryOrderedSetStore<String, i64>,
    participant_locks: KeyLocks<String>,
}

impl CorrectionPipeline {
    pub fn new(config: PipelineConfig, routes: Arc<RouteStore>) -> Self {
        Self {
            config,
            routes,
            locations: MemoryKeyValueStore::new(),
            previous_positions: MemoryKeyValueStore::new(),
            checkpoint_pass_times: MemoryKeyValueStore::new(),
            segment_records: MemoryKeyValueStore::new(),
            leaderboards: MemoryOrderedSetStore::new(),
            participant_locks: KeyLocks::new(),
        }
    }

    fn participant_key(&self, request: &CorrectionRequest) -> String {
        format!("{}:{}:{}", request.user_id, request.event_id, request.event_detail_id)
    }

    /// Runs one correction call end to end.
    pub async fn correct(&self, request: CorrectionRequest, now_sec: i64) -> Result<CorrectionResponse> {
        if request.gps_data.is_empty() {
            return Err(CoreError::invalid_input("gps_data batch is empty"));
        }

        let lock = self.participant_locks.get(&self.participant_key(&request));
        let _guard = lock.lock().await;

        let timeout_dur = Duration::from_millis(self.config.store.call_timeout_ms);

        let route = match timeout(timeout_dur, async {
            self.routes.get(request.event_id, request.event_detail_id)
        })
        .await
        {
            Ok(route) => route,
            Err(_) => {
                log::warn!("[CorrectionPipeline] route lookup timed out, continuing unmatched");
                None
            }
        };

        let mut filter = KalmanFilter3D::new(self.config.kalman.clone());
        let last_sample = request.gps_data.last().expect("checked non-empty above");

        for sample in &request.gps_data {
            let confidence = derive_confidence(sample.accuracy, sample.speed);
            filter.update(sample.lat, sample.lng, sample.altitude, confidence);
        }

        let (corrected_lat, corrected_lng, corrected_alt) = filter.current_position();
        let gps_confidence = derive_confidence(last_sample.accuracy, last_sample.speed);
        let timestamp = parse_timestamp(&last_sample.timestamp, now_sec);

        let match_result = route
            .as_ref()
            .map(|r| matcher::match_point(corrected_lat, corrected_lng, last_sample.heading, r, &self.config.matching));

        let participant_key = self.participant_key(&request);

        let previous_position = self
            .previous_positions
            .get(&participant_key)
            .unwrap_or(None);

        let mut checkpoint_reaches = Vec::new();

        if let Some(route) = route.as_ref() {
            let already_crossed = self
                .checkpoint_pass_times
                .get(&participant_key)
                .unwrap_or(None)
                .unwrap_or_default();

            let crossings = checkpoint::detect(
                previous_position.as_ref(),
                corrected_lat,
                corrected_lng,
                timestamp,
                route,
                &already_crossed.keys().cloned().collect(),
                &self.config.checkpoint,
            );

            if !crossings.is_empty() {
                let mut pass_times = already_crossed.clone();
                let mut records = self
                    .segment_records
                    .get(&participant_key)
                    .unwrap_or(None)
                    .unwrap_or_default();

                let event_start = request
                    .event_start_time_sec
                    .unwrap_or_else(|| now_sec + self.config.store.fallback_event_start_offset_secs);
                if request.event_start_time_sec.is_none() {
                    log::warn!(
                        "[CorrectionPipeline] no event_start_time_sec supplied, falling back to now{}s",
                        self.config.store.fallback_event_start_offset_secs
                    );
                }

                let mut last_crossing: Option<(i64, Option<i64>)> = latest_crossing(&pass_times, &records);

                for crossing in &crossings {
                    let duration = segment_timer::compute(
                        crossing.pass_time_sec,
                        last_crossing,
                        event_start,
                        &self.config.checkpoint,
                    );

                    pass_times.insert(crossing.checkpoint_id.clone(), crossing.pass_time_sec);
                    records.insert(
                        crossing.checkpoint_id.clone(),
                        (duration.segment_duration_sec, duration.cumulative_duration_sec),
                    );

                    checkpoint_reaches.push(CheckpointReach {
                        checkpoint_id: crossing.checkpoint_id.clone(),
                        checkpoint_index: crossing.checkpoint_index,
                        pass_time: crossing.pass_time_sec,
                        segment_duration_sec: duration.segment_duration_sec,
                        cumulative_duration_sec: duration.cumulative_duration_sec,
                    });

                    last_crossing = Some((crossing.pass_time_sec, duration.cumulative_duration_sec));
                }

                if let Err(e) = self.checkpoint_pass_times.set(participant_key.clone(), pass_times, self.config.store.participant_state_ttl_secs) {
                    log::warn!("[CorrectionPipeline] failed to persist checkpoint pass times: {}", e);
                }
                if let Err(e) = self.segment_records.set(participant_key.clone(), records, self.config.store.participant_state_ttl_secs) {
                    log::warn!("[CorrectionPipeline] failed to persist segment records: {}", e);
                }
            }
        }

        if let Err(e) = self.previous_positions.set(
            participant_key.clone(),
            PreviousPosition { lat: corrected_lat, lng: corrected_lng, timestamp_sec: timestamp },
            self.config.store.participant_state_ttl_secs,
        ) {
            log::warn!("[CorrectionPipeline] failed to persist previous position: {}", e);
        }

        let previous_location = self.locations.get(&location::location_key(
            request.event_id,
            request.event_detail_id,
            request.user_id,
        )).unwrap_or(None);

        let next_loc = location::next_location(
            previous_location.as_ref(),
            last_sample.lat,
            last_sample.lng,
            last_sample.altitude,
            last_sample.accuracy,
            last_sample.speed,
            last_sample.heading,
            timestamp,
            corrected_lat,
            corrected_lng,
            corrected_alt,
            match_result.as_ref().map(|m| m.distance_from_start),
        );

        if let Err(e) = location::write(
            &self.locations,
            request.event_id,
            request.event_detail_id,
            request.user_id,
            next_loc.clone(),
            self.config.store.participant_state_ttl_secs,
        ) {
            log::warn!("[CorrectionPipeline] failed to persist participant location: {}", e);
        }

        let (leaderboard_cp_index, leaderboard_cumulative) = {
            let pass_times = self.checkpoint_pass_times.get(&participant_key).unwrap_or(None);
            let records = self.segment_records.get(&participant_key).unwrap_or(None);
            match (route.as_ref(), pass_times, records) {
                (Some(r), Some(pass_times), Some(records)) if !pass_times.is_empty() => {
                    furthest_checkpoint(r, &pass_times, &records)
                }
                _ => (0, next_loc.cumulative_time_sec),
            }
        };

        if let Err(e) = leaderboard::update(
            &self.leaderboards,
            request.event_id,
            request.event_detail_id,
            request.user_id,
            leaderboard_cp_index,
            leaderboard_cumulative,
            &self.config.leaderboard,
        ) {
            log::warn!("[CorrectionPipeline] failed to update leaderboard: {}", e);
        }

        let matching_quality = build_matching_quality(
            last_sample.lat,
            last_sample.lng,
            corrected_lat,
            corrected_lng,
            gps_confidence,
            match_result.as_ref(),
        );

        let nearest_route_point = match_result.as_ref().map(|m| NearestRoutePoint {
            lat: m.matched_point.lat,
            lng: m.matched_point.lng,
            distance_to_point: m.distance_to_route,
            distance_from_start: m.distance_from_start,
            route_progress: m.route_progress,
            route_bearing: m.route_bearing,
        });

        Ok(CorrectionResponse {
            user_id: request.user_id,
            event_id: request.event_id,
            event_detail_id: request.event_detail_id,
            latitude: corrected_lat,
            longitude: corrected_lng,
            altitude: corrected_alt,
            timestamp,
            checkpoint_reaches,
            nearest_route_point,
            matching_quality,
        })
    }
}

fn latest_crossing(
    pass_times: &HashMap<String, i64>,
    records: &HashMap<String, (Option<i64>, Option<i64>)>,
) -> Option<(i64, Option<i64>)> {
    pass_times
        .iter()
        .max_by_key(|(_, &t)| t)
        .map(|(id, &t)| (t, records.get(id).and_then(|(_, cumulative)| *cumulative)))
}

fn furthest_checkpoint(
    route: &crate::route::Route,
    pass_times: &HashMap<String, i64>,
    records: &HashMap<String, (Option<i64>, Option<i64>)>,
) -> (u32, i64) {
    let best = route
        .checkpoints()
        .filter_map(|cp| {
            let id = cp.checkpoint_id.as_ref()?;
            let index = cp.checkpoint_index?;
            if pass_times.contains_key(id) {
                Some(index)
            } else {
                None
            }
        })
        .max();

    match best {
        Some(index) => {
            let cumulative = route
                .checkpoints()
                .find(|cp| cp.checkpoint_index == Some(index))
                .and_then(|cp| cp.checkpoint_id.as_ref())
                .and_then(|id| records.get(id))
                .and_then(|(_, cumulative)| *cumulative)
                .unwrap_or(0);
            (index, cumulative)
        }
        None => (0, 0),
    }
}

fn correction_strength_bucket(displacement_m: f64) -> f64 {
    if displacement_m < 1.0 {
        0.1
    } else if displacement_m < 5.0 {
        0.3
    } else if displacement_m < 15.0 {
        0.6
    } else if displacement_m < 50.0 {
        0.8
    } else {
        1.0
    }
}

fn build_matching_quality(
    raw_lat: f64,
    raw_lng: f64,
    corrected_lat: f64,
    corrected_lng: f64,
    gps_confidence: f64,
    match_result: Option<&MatchResult>,
) -> MatchingQuality {
    let displacement = crate::geo::distance(raw_lat, raw_lng, corrected_lat, corrected_lng);
    let correction_strength = correction_strength_bucket(displacement);

    let matched = match_result.map(|m| m.matched).unwrap_or(false);
    let match_score = match_result.map(|m| m.match_score).unwrap_or(f64::MAX);
    let bearing_difference = match_result.and_then(|m| m.bearing_difference);

    // matchScore is a distance in meters; smaller is better, so invert it into a 0..1 contribution.
    let match_score_component = if match_score.is_finite() { (1.0 - (match_score / 100.0).min(1.0)) * 30.0 } else { 0.0 };

    let composite = (if matched { 40.0 } else { 0.0 })
        + match_score_component
        + gps_confidence * 20.0
        + (1.0 - correction_strength) * 10.0;

    let grade = if composite >= 85.0 {
        "EXCELLENT"
    } else if composite >= 70.0 {
        "GOOD"
    } else if composite >= 50.0 {
        "FAIR"
    } else {
        "POOR"
    };

    MatchingQuality {
        matched,
        match_score,
        bearing_difference,
        gps_confidence: Some(gps_confidence),
        correction_strength,
        quality_grade: grade.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    const SIMPLE_TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="0.0" lon="0.0"/>
    <trkpt lat="0.01" lon="0.0"/>
  </trkseg></trk>
</gpx>"#;

    fn sample(lat: f64, lng: f64, ts: i64) -> GpsSample {
        GpsSample { lat, lng, altitude: None, accuracy: Some(5.0), speed: Some(2.0), heading: None, timestamp: TimestampValue::Numeric(ts) }
    }

    #[tokio::test]
    async fn test_missing_route_is_unmatched_but_succeeds() {
        let routes = Arc::new(RouteStore::default());
        let pipeline = CorrectionPipeline::new(PipelineConfig::default(), routes);

        let request = CorrectionRequest {
            user_id: 1,
            event_id: 42,
            event_detail_id: 1,
            gps_data: vec![sample(10.0, 10.0, 1_700_000_000)],
            event_start_time_sec: None,
        };

        let response = pipeline.correct(request, 1_700_000_100).await.unwrap();
        assert!(!response.matching_quality.matched);
        assert!(response.checkpoint_reaches.is_empty());
    }

    #[tokio::test]
    async fn test_straight_line_route_crosses_start() {
        let routes = Arc::new(RouteStore::default());
        routes.load(1, 1, SIMPLE_TRACK.as_bytes(), &RouteConfig::default()).unwrap();
        let pipeline = CorrectionPipeline::new(PipelineConfig::default(), routes);

        let request = CorrectionRequest {
            user_id: 1,
            event_id: 1,
            event_detail_id: 1,
            gps_data: vec![sample(0.0, 0.0, 1_700_000_000)],
            event_start_time_sec: Some(1_700_000_000),
        };

        let response = pipeline.correct(request, 1_700_000_100).await.unwrap();
        assert!(response.checkpoint_reaches.iter().any(|c| c.checkpoint_id == "START"));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let routes = Arc::new(RouteStore::default());
        let pipeline = CorrectionPipeline::new(PipelineConfig::default(), routes);
        let request = CorrectionRequest {
            user_id: 1,
            event_id: 1,
            event_detail_id: 1,
            gps_data: vec![],
            event_start_time_sec: None,
        };
        assert!(pipeline.correct(request, 0).await.is_err());
    }

    #[test]
    fn test_timestamp_parsing_unix_seconds_and_millis_agree() {
        let secs = parse_timestamp(&TimestampValue::Numeric(1_700_000_000), 0);
        let millis = parse_timestamp(&TimestampValue::Numeric(1_700_000_000_000), 0);
        assert_eq!(secs, millis);
    }

    #[test]
    fn test_timestamp_parsing_iso8601() {
        let parsed = parse_timestamp(&TimestampValue::Text("2023-11-14T22:13:20+00:00".to_string()), 0);
        assert_eq!(parsed, 1_700_000_000);
    }

    #[test]
    fn test_request_parses_camel_case_wire_json() {
        let json = r#"{
            "userId": 7, "eventId": 1, "eventDetailId": 1,
            "gpsData": [{"lat": 37.5, "lng": 127.0, "altitude": null,
                "accuracy": 5.0, "speed": 2.0, "heading": null, "timestamp": 1700000000}],
            "eventStartTimeSec": 1699999000
        }"#;
        let request = CorrectionRequest::from_json(json).unwrap();
        assert_eq!(request.user_id, 7);
        assert_eq!(request.gps_data.len(), 1);
        assert_eq!(request.event_start_time_sec, Some(1_699_999_000));
    }

    #[test]
    fn test_request_json_omitting_event_start_time_defaults_to_none() {
        let json = r#"{
            "userId": 1, "eventId": 1, "eventDetailId": 1,
            "gpsData": [{"lat": 0.0, "lng": 0.0, "timestamp": 1700000000}]
        }"#;
        let request = CorrectionRequest::from_json(json).unwrap();
        assert_eq!(request.event_start_time_sec, None);
    }

    #[test]
    fn test_request_rejects_malformed_json() {
        assert!(CorrectionRequest::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_response_serializes_to_camel_case_wire_json() {
        let routes = Arc::new(RouteStore::default());
        let pipeline = CorrectionPipeline::new(PipelineConfig::default(), routes);
        let request = CorrectionRequest {
            user_id: 1,
            event_id: 1,
            event_detail_id: 1,
            gps_data: vec![sample(10.0, 10.0, 1_700_000_000)],
            event_start_time_sec: None,
        };
        let response = pipeline.correct(request, 1_700_000_100).await.unwrap();
        let json = response.to_json();
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"matchingQuality\""));
        assert!(json.contains("\"checkpointReaches\""));
    }
}
