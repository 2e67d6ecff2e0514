//! Snaps a GPS sample onto the nearest point of a densified route.
//!
//! Candidate segments are pre-filtered through the route's R-tree (see
//! `route::store`) rather than scanning every segment, narrowing the field
//! down to a handful of nearby indices before the expensive exact
//! point-to-segment distance check runs.

use crate::config::MatchConfig;
use crate::geo::{self, GeoPoint, Projection};
use crate::route::Route;

/// Outcome of matching one sample against a route.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    pub matched_point: GeoPoint,
    pub distance_to_route: f64,
    pub nearest_index: usize,
    pub route_bearing: f64,
    pub current_bearing: Option<f64>,
    pub bearing_difference: Option<f64>,
    pub route_progress: f64,
    pub distance_from_start: f64,
    pub match_score: f64,
}

/// Matches `(lat, lng)` — with an optional sample heading — against `route`.
pub fn match_point(lat: f64, lng: f64, bearing_deg: Option<f64>, route: &Route, config: &MatchConfig) -> MatchResult {
    let sample = GeoPoint::new(lat, lng);

    let candidates = candidate_segment_indices(route, lat, lng, config.candidate_window);

    let mut best: Option<(usize, Projection, f64, f64, f64)> = None; // (seg_idx, proj, route_bearing, bearing_diff, score)

    for &seg_idx in &candidates {
        let a = route.points[seg_idx].point;
        let b = route.points[seg_idx + 1].point;
        let proj = geo::point_to_segment(sample, a, b);
        let route_bearing = geo::bearing(a.lat, a.lng, b.lat, b.lng);

        let bearing_diff = bearing_deg.map(|bd| geo::bearing_difference(bd, route_bearing));
        let score = proj.distance_m + config.bearing_weight * bearing_diff.unwrap_or(0.0);

        let is_better = match &best {
            None => true,
            Some((best_idx, _, _, _, best_score)) => {
                score < *best_score || (score == *best_score && seg_idx < *best_idx)
            }
        };

        if is_better {
            best = Some((seg_idx, proj, route_bearing, bearing_diff.unwrap_or(0.0), score));
        }
    }

    let (seg_idx, proj, route_bearing, bearing_diff_val, _score) = best.expect("route has at least one segment");

    let a = &route.points[seg_idx];
    let b = &route.points[seg_idx + 1];
    let distance_from_start = a.distance_from_start + proj.t * (b.distance_from_start - a.distance_from_start);
    let route_progress = if route.total_distance > 0.0 {
        (distance_from_start / route.total_distance).clamp(0.0, 1.0)
    } else {
        0.0
    };

    MatchResult {
        matched: proj.distance_m <= config.match_threshold_m,
        matched_point: proj.foot,
        distance_to_route: proj.distance_m,
        nearest_index: seg_idx,
        route_bearing,
        current_bearing: bearing_deg,
        bearing_difference: bearing_deg.map(|_| bearing_diff_val),
        route_progress,
        distance_from_start,
        match_score: proj.distance_m,
    }
}

/// Candidate segment start indices to evaluate exactly, drawn from the
/// R-tree's nearest route points. Falls back to every segment when the
/// route is small enough that the window doesn't help.
fn candidate_segment_indices(route: &Route, lat: f64, lng: f64, window: usize) -> Vec<usize> {
    if route.points.len() <= window + 1 {
        return (0..route.points.len().saturating_sub(1)).collect();
    }

    let nearest = route.nearest_indices(lat, lng, window);
    let mut segments = std::collections::BTreeSet::new();
    let last = route.points.len() - 1;
    for idx in nearest {
        if idx > 0 {
            segments.insert(idx - 1);
        }
        if idx < last {
            segments.insert(idx);
        }
    }
    if segments.is_empty() {
        return (0..last).collect();
    }
    segments.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::route::RouteStore;

    const SIMPLE_TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="0.0" lon="0.0"/>
    <trkpt lat="0.01" lon="0.0"/>
  </trkseg></trk>
</gpx>"#;

    fn load_route() -> std::sync::Arc<crate::route::Route> {
        let store = RouteStore::default();
        store.load(1, 1, SIMPLE_TRACK.as_bytes(), &RouteConfig::default()).unwrap()
    }

    #[test]
    fn test_point_on_route_matches_with_zero_distance() {
        let route = load_route();
        let config = MatchConfig::default();
        let p = route.points[2].point;
        let result = match_point(p.lat, p.lng, None, &route, &config);
        assert!(result.matched);
        assert!(result.distance_to_route < 1.0);
    }

    #[test]
    fn test_far_point_is_unmatched() {
        let route = load_route();
        let config = MatchConfig::default();
        let result = match_point(0.005, 5.0, None, &route, &config);
        assert!(!result.matched);
        assert!(result.distance_to_route > config.match_threshold_m);
    }

    #[test]
    fn test_route_progress_increases_along_route() {
        let route = load_route();
        let config = MatchConfig::default();
        let early = match_point(route.points[1].point.lat, route.points[1].point.lng, None, &route, &config);
        let late_idx = route.points.len() - 2;
        let late = match_point(
            route.points[late_idx].point.lat,
            route.points[late_idx].point.lng,
            None,
            &route,
            &config,
        );
        assert!(late.route_progress > early.route_progress);
    }

    #[test]
    fn test_bearing_alignment_influences_tie_break() {
        let route = load_route();
        let config = MatchConfig::default();
        let p = route.points[3].point;
        let aligned = match_point(p.lat, p.lng, Some(0.0), &route, &config);
        let misaligned = match_point(p.lat, p.lng, Some(180.0), &route, &config);
        assert!(aligned.bearing_difference.unwrap() <= misaligned.bearing_difference.unwrap());
    }
}
