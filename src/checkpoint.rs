//! First-crossing checkpoint detection.
//!
//! A checkpoint "crosses" the first time a participant's position enters its
//! radius and was not already recorded as crossed. With no previous position
//! on record (the participant's first sample of the event), the current
//! sample alone decides the crossing rather than requiring a prior
//! outside-radius observation.

use std::collections::HashSet;

use crate::config::CheckpointConfig;
use crate::geo;
use crate::route::{PointKind, Route};

/// A participant's last known corrected position.
#[derive(Debug, Clone, Copy)]
pub struct PreviousPosition {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_sec: i64,
}

/// One checkpoint entered for the first time during a `detect` call.
#[derive(Debug, Clone)]
pub struct Crossing {
    pub checkpoint_id: String,
    pub checkpoint_index: u32,
    pub pass_time_sec: i64,
}

/// Detects checkpoint crossings between a previous and current position.
///
/// `already_crossed` holds the checkpoint ids already recorded for this
/// participant; a checkpoint present there is never re-emitted.
pub fn detect(
    previous: Option<&PreviousPosition>,
    cur_lat: f64,
    cur_lng: f64,
    cur_timestamp_sec: i64,
    route: &Route,
    already_crossed: &HashSet<String>,
    config: &CheckpointConfig,
) -> Vec<Crossing> {
    let mut crossings = Vec::new();

    let mut checkpoints: Vec<_> = route
        .points
        .iter()
        .filter(|p| matches!(p.kind, PointKind::Start | PointKind::Checkpoint | PointKind::Finish))
        .collect();
    checkpoints.sort_by_key(|p| p.checkpoint_index.unwrap_or(u32::MAX));

    for cp in checkpoints {
        let (Some(cp_id), Some(cp_index)) = (cp.checkpoint_id.as_ref(), cp.checkpoint_index) else {
            continue;
        };

        if already_crossed.contains(cp_id) {
            continue;
        }

        let dist_cur = geo::distance(cur_lat, cur_lng, cp.point.lat, cp.point.lng);
        if dist_cur > config.radius_m {
            continue;
        }

        let was_outside = match previous {
            None => true,
            Some(prev) => geo::distance(prev.lat, prev.lng, cp.point.lat, cp.point.lng) > config.radius_m,
        };

        if was_outside {
            crossings.push(Crossing {
                checkpoint_id: cp_id.clone(),
                checkpoint_index: cp_index,
                pass_time_sec: cur_timestamp_sec,
            });
        }
    }

    crossings
}
