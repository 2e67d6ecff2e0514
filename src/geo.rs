//! Pure geographic math: distance, bearing, interpolation, projection.
//!
//! Stateless by design — nothing here touches a store or a config default
//! beyond what is passed in. `GeoPoint` and `Bounds` are the shared
//! coordinate types; `point_to_segment` and the bearing helpers carry the
//! rest of the math the correction pipeline needs to snap a sample onto a
//! route.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A bare lat/lng pair, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn checked(lat: f64, lng: f64) -> Result<Self> {
        let p = Self::new(lat, lng);
        if p.is_valid() {
            Ok(p)
        } else {
            Err(CoreError::invalid_input(format!(
                "coordinate out of range: ({}, {})",
                lat, lng
            )))
        }
    }
}

/// Bounding box over a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;
        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lng = min_lng.min(p.lng);
            max_lng = max_lng.max(p.lng);
        }
        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.min_lat + self.max_lat) / 2.0, (self.min_lng + self.max_lng) / 2.0)
    }
}

/// Great-circle distance between two points, in meters.
pub fn distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let p1 = Point::new(lng1, lat1);
    let p2 = Point::new(lng2, lat2);
    Haversine::distance(p1, p2)
}

/// Initial bearing from point 1 to point 2, in degrees, `[0, 360)`.
pub fn bearing(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Smallest absolute angular difference between two bearings, in `[0, 180]`.
pub fn bearing_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Linear interpolation between two points at `ratio` in `[0, 1]`.
pub fn interpolate(a: GeoPoint, b: GeoPoint, ratio: f64) -> GeoPoint {
    GeoPoint::new(a.lat + (b.lat - a.lat) * ratio, a.lng + (b.lng - a.lng) * ratio)
}

/// Linear interpolation of an optional elevation pair.
pub fn interpolate_elevation(a: Option<f64>, b: Option<f64>, ratio: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + (b - a) * ratio),
        _ => None,
    }
}

/// Result of projecting a point onto a segment `a -> b`.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    /// Distance in meters from `p` to the foot of the perpendicular.
    pub distance_m: f64,
    /// Parameter along the segment in `[0, 1]` where the foot lies.
    pub t: f64,
    pub foot: GeoPoint,
}

/// Projects `p` onto segment `a -> b` using a local planar approximation
/// (adequate at per-sample scale) and returns the distance to the foot.
pub fn point_to_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> Projection {
    // Scale longitude by cos(latitude) so the local plane is roughly isotropic in meters.
    let lat_ref = a.lat.to_radians();
    let cos_lat = lat_ref.cos().max(1e-6);

    let ax = a.lng * cos_lat;
    let ay = a.lat;
    let bx = b.lng * cos_lat;
    let by = b.lat;
    let px = p.lng * cos_lat;
    let py = p.lat;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let foot = interpolate(a, b, t);
    let distance_m = distance(p.lat, p.lng, foot.lat, foot.lng);

    Projection { distance_m, t, foot }
}
