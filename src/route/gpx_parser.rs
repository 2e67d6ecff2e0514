//! GPX 1.1 ingestion, delegated to the `gpx` crate rather than hand-rolled
//! XML walking. Tracks are preferred over routes when a file has both,
//! matching how most GPX exporters record an activity.

use std::io::Cursor;

use gpx::read as read_gpx;

use crate::error::{CoreError, Result};
use crate::geo::GeoPoint;

/// A single waypoint lifted out of a GPX track or route.
#[derive(Debug, Clone)]
pub struct RawWaypoint {
    pub point: GeoPoint,
    pub elevation: Option<f64>,
}

/// Parses GPX bytes into an ordered list of waypoints.
///
/// Tracks are preferred; if the file has no tracks, the first route is used
/// instead. Negative elevations are treated as missing, matching GPS
/// hardware that reports them when no fix was available.
pub fn parse_gpx(bytes: &[u8], max_bytes: usize) -> Result<Vec<RawWaypoint>> {
    if bytes.is_empty() {
        return Err(CoreError::invalid_input("gpx payload is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(CoreError::invalid_input(format!(
            "gpx payload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            max_bytes
        )));
    }

    let gpx = read_gpx(Cursor::new(bytes))
        .map_err(|e| CoreError::invalid_input(format!("could not parse gpx: {}", e)))?;

    let mut waypoints = Vec::new();

    if !gpx.tracks.is_empty() {
        for track in &gpx.tracks {
            for segment in &track.segments {
                for wpt in &segment.points {
                    waypoints.push(to_raw_waypoint(wpt));
                }
            }
        }
    } else if let Some(route) = gpx.routes.first() {
        for wpt in &route.points {
            waypoints.push(to_raw_waypoint(wpt));
        }
    }

    if waypoints.len() < 2 {
        return Err(CoreError::invalid_input(
            "gpx file has fewer than 2 usable waypoints (no tracks or routes found)",
        ));
    }

    Ok(waypoints)
}

fn to_raw_waypoint(wpt: &gpx::Waypoint) -> RawWaypoint {
    let lng = wpt.point().x();
    let lat = wpt.point().y();
    let elevation = wpt.elevation.filter(|e| *e >= 0.0);
    RawWaypoint {
        point: GeoPoint::new(lat, lng),
        elevation,
    }
}
