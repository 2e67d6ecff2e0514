//! Densification and checkpoint classification.
//!
//! Turns a raw waypoint list into the polyline the matcher and detector
//! operate on: consecutive points no farther apart than `spacing`, with
//! start/checkpoint/finish markers placed at fixed distance intervals.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geo::{self, GeoPoint};
use crate::route::gpx_parser::RawWaypoint;

/// What role a point plays on the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    Start,
    Interpolated,
    Checkpoint,
    Finish,
}

/// A single point of the densified route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePoint {
    pub point: GeoPoint,
    pub elevation: Option<f64>,
    pub distance_from_start: f64,
    pub sequence: usize,
    pub kind: PointKind,
    pub checkpoint_id: Option<String>,
    pub checkpoint_index: Option<u32>,
}

/// Densifies a raw waypoint list and classifies checkpoints.
///
/// `spacing` bounds the distance between consecutive emitted points;
/// `checkpoint_spacing` controls how often a `Checkpoint` marker is placed.
pub fn densify(
    waypoints: &[RawWaypoint],
    spacing: f64,
    checkpoint_spacing: f64,
    min_total_distance: f64,
) -> Result<Vec<RoutePoint>> {
    if waypoints.len() < 2 {
        return Err(CoreError::invalid_input("route needs at least 2 waypoints"));
    }

    for wpt in waypoints {
        if !wpt.point.is_valid() {
            return Err(CoreError::invalid_input(format!(
                "invalid coordinate in gpx: ({}, {})",
                wpt.point.lat, wpt.point.lng
            )));
        }
    }

    let mut dense: Vec<(GeoPoint, Option<f64>, f64)> = Vec::new();
    let mut cumulative = 0.0;
    dense.push((waypoints[0].point, waypoints[0].elevation, 0.0));

    for pair in waypoints.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let seg_len = geo::distance(a.point.lat, a.point.lng, b.point.lat, b.point.lng);

        if seg_len > spacing {
            let steps = (seg_len / spacing).floor() as usize;
            for step in 1..=steps {
                let ratio = (step as f64 * spacing) / seg_len;
                if ratio >= 1.0 {
                    break;
                }
                let p = geo::interpolate(a.point, b.point, ratio);
                let ele = geo::interpolate_elevation(a.elevation, b.elevation, ratio);
                let dist = cumulative + seg_len * ratio;
                dense.push((p, ele, dist));
            }
        }

        cumulative += seg_len;
        dense.push((b.point, b.elevation, cumulative));
    }

    let total_distance = cumulative;
    if total_distance < min_total_distance {
        return Err(CoreError::invalid_input(format!(
            "route distance {:.1}m is below the minimum of {:.1}m",
            total_distance, min_total_distance
        )));
    }

    let last_index = dense.len() - 1;
    let mut checkpoint_counter = 0u32;
    let mut route_points = Vec::with_capacity(dense.len());

    for (i, (point, elevation, distance_from_start)) in dense.into_iter().enumerate() {
        let (kind, checkpoint_id, checkpoint_index) = if i == 0 {
            let idx = checkpoint_counter;
            checkpoint_counter += 1;
            (PointKind::Start, Some("START".to_string()), Some(idx))
        } else if i == last_index {
            let idx = checkpoint_counter;
            checkpoint_counter += 1;
            (PointKind::Finish, Some("FINISH".to_string()), Some(idx))
        } else if is_checkpoint_distance(distance_from_start, checkpoint_spacing, spacing) {
            let n = (distance_from_start / checkpoint_spacing).floor() as u64;
            let idx = checkpoint_counter;
            checkpoint_counter += 1;
            (PointKind::Checkpoint, Some(format!("CP{}", n)), Some(idx))
        } else {
            (PointKind::Interpolated, None, None)
        };

        route_points.push(RoutePoint {
            point,
            elevation,
            distance_from_start,
            sequence: i,
            kind,
            checkpoint_id,
            checkpoint_index,
        });
    }

    Ok(route_points)
}

fn is_checkpoint_distance(distance_from_start: f64, checkpoint_spacing: f64, tolerance: f64) -> bool {
    if checkpoint_spacing <= 0.0 {
        return false;
    }
    let remainder = distance_from_start % checkpoint_spacing;
    remainder < tolerance || (checkpoint_spacing - remainder) < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoint(lat: f64, lng: f64) -> RawWaypoint {
        RawWaypoint { point: GeoPoint::new(lat, lng), elevation: None }
    }

    #[test]
    fn test_densification_bound() {
        // Roughly 1km straight line, spacing 100m.
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(0.009, 0.0)];
        let points = densify(&waypoints, 100.0, 1000.0, 10.0).unwrap();
        for pair in points.windows(2) {
            let d = geo::distance(
                pair[0].point.lat,
                pair[0].point.lng,
                pair[1].point.lat,
                pair[1].point.lng,
            );
            assert!(d <= 100.0 + 1.0, "gap {} exceeds spacing", d);
        }
    }

    #[test]
    fn test_distance_from_start_strictly_increasing() {
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(0.009, 0.0)];
        let points = densify(&waypoints, 100.0, 1000.0, 10.0).unwrap();
        for pair in points.windows(2) {
            assert!(pair[1].distance_from_start > pair[0].distance_from_start);
        }
    }

    #[test]
    fn test_start_and_finish_markers() {
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(0.009, 0.0)];
        let points = densify(&waypoints, 100.0, 1000.0, 10.0).unwrap();
        assert_eq!(points.first().unwrap().kind, PointKind::Start);
        assert_eq!(points.last().unwrap().kind, PointKind::Finish);
    }

    #[test]
    fn test_checkpoint_index_monotonic() {
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(0.02, 0.0)]; // ~2.2km
        let points = densify(&waypoints, 100.0, 1000.0, 10.0).unwrap();
        let indices: Vec<u32> = points.iter().filter_map(|p| p.checkpoint_index).collect();
        for pair in indices.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(indices.len() >= 3); // start, at least one CP, finish
    }

    #[test]
    fn test_rejects_too_short_route() {
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(0.00001, 0.0)];
        assert!(densify(&waypoints, 100.0, 1000.0, 10.0).is_err());
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        let waypoints = vec![waypoint(0.0, 0.0), waypoint(91.0, 0.0)];
        assert!(densify(&waypoints, 100.0, 1000.0, 10.0).is_err());
    }
}
