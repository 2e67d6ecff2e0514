//! Holds parsed routes keyed by `(event_id, event_detail_id)`, each with a
//! pre-built R-tree over its densified points for the matcher's nearest
//! neighbor search.
//!
//! Backed by a `RwLock<HashMap<_, Arc<Route>>>` keyed per route rather than
//! a single global slot, since many independent routes (one per event
//! detail) are live at once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::config::RouteConfig;
use crate::error::{CoreError, Result};
use crate::route::densify::{densify, PointKind, RoutePoint};
use crate::route::gpx_parser::parse_gpx;

/// A route point indexed for nearest-neighbor lookups.
#[derive(Debug, Clone, Copy)]
pub struct IndexedRoutePoint {
    pub idx: usize,
    pub lat: f64,
    pub lng: f64,
}

impl RTreeObject for IndexedRoutePoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedRoutePoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// A loaded, densified route ready for matching.
pub struct Route {
    pub event_id: i64,
    pub event_detail_id: i64,
    pub points: Vec<RoutePoint>,
    pub total_distance: f64,
    index: RTree<IndexedRoutePoint>,
}

impl Route {
    fn build(event_id: i64, event_detail_id: i64, points: Vec<RoutePoint>) -> Self {
        let total_distance = points.last().map(|p| p.distance_from_start).unwrap_or(0.0);
        let indexed: Vec<IndexedRoutePoint> = points
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedRoutePoint { idx, lat: p.point.lat, lng: p.point.lng })
            .collect();
        let index = RTree::bulk_load(indexed);
        Self { event_id, event_detail_id, points, total_distance, index }
    }

    /// Indices of the `k` route points nearest to `(lat, lng)`.
    pub fn nearest_indices(&self, lat: f64, lng: f64, k: usize) -> Vec<usize> {
        self.index
            .nearest_neighbor_iter(&[lat, lng])
            .take(k)
            .map(|p| p.idx)
            .collect()
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &RoutePoint> {
        self.points.iter().filter(|p| {
            matches!(p.kind, PointKind::Start | PointKind::Checkpoint | PointKind::Finish)
        })
    }
}

struct Entry {
    route: Arc<Route>,
    expires_at: Instant,
}

/// Thread-safe store of loaded routes, keyed by `(event_id, event_detail_id)`.
pub struct RouteStore {
    routes: RwLock<HashMap<(i64, i64), Entry>>,
    by_event: RwLock<HashMap<i64, i64>>,
    ttl: Duration,
}

impl RouteStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            by_event: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Parses, densifies, and stores a GPX file for `(event_id, event_detail_id)`.
    pub fn load(
        &self,
        event_id: i64,
        event_detail_id: i64,
        gpx_bytes: &[u8],
        config: &RouteConfig,
    ) -> Result<Arc<Route>> {
        let waypoints = parse_gpx(gpx_bytes, config.max_gpx_bytes)?;
        let points = densify(
            &waypoints,
            config.spacing_m,
            config.checkpoint_spacing_m,
            config.min_route_distance_m,
        )?;

        let route = Arc::new(Route::build(event_id, event_detail_id, points));

        log::info!(
            "[RouteStore] loaded route for event {} detail {}: {} points, {:.0}m",
            event_id,
            event_detail_id,
            route.points.len(),
            route.total_distance
        );

        self.routes.write().map_err(|_| CoreError::internal("route store lock poisoned"))?.insert(
            (event_id, event_detail_id),
            Entry { route: route.clone(), expires_at: Instant::now() + self.ttl },
        );
        self.by_event
            .write()
            .map_err(|_| CoreError::internal("route store lock poisoned"))?
            .insert(event_id, event_detail_id);

        Ok(route)
    }

    pub fn get(&self, event_id: i64, event_detail_id: i64) -> Option<Arc<Route>> {
        let guard = self.routes.read().ok()?;
        let entry = guard.get(&(event_id, event_detail_id))?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.route.clone())
    }

    pub fn get_by_event_id(&self, event_id: i64) -> Option<Arc<Route>> {
        let event_detail_id = *self.by_event.read().ok()?.get(&event_id)?;
        self.get(event_id, event_detail_id)
    }

    pub fn delete(&self, event_id: i64, event_detail_id: i64) {
        if let Ok(mut guard) = self.routes.write() {
            guard.remove(&(event_id, event_detail_id));
        }
    }
}

impl Default for RouteStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(RouteConfig::default().ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="0.0" lon="0.0"/>
    <trkpt lat="0.02" lon="0.0"/>
  </trkseg></trk>
</gpx>"#;

    #[test]
    fn test_load_and_get() {
        let store = RouteStore::default();
        let config = RouteConfig::default();
        store.load(1, 2, SIMPLE_TRACK.as_bytes(), &config).unwrap();
        let route = store.get(1, 2).unwrap();
        assert!(route.points.len() > 2);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = RouteStore::default();
        assert!(store.get(999, 999).is_none());
    }

    #[test]
    fn test_secondary_index_by_event_id() {
        let store = RouteStore::default();
        let config = RouteConfig::default();
        store.load(5, 6, SIMPLE_TRACK.as_bytes(), &config).unwrap();
        assert!(store.get_by_event_id(5).is_some());
    }

    #[test]
    fn test_delete_removes_route() {
        let store = RouteStore::default();
        let config = RouteConfig::default();
        store.load(1, 2, SIMPLE_TRACK.as_bytes(), &config).unwrap();
        store.delete(1, 2);
        assert!(store.get(1, 2).is_none());
    }

    #[test]
    fn test_nearest_indices_returns_requested_count() {
        let store = RouteStore::default();
        let config = RouteConfig::default();
        store.load(1, 2, SIMPLE_TRACK.as_bytes(), &config).unwrap();
        let route = store.get(1, 2).unwrap();
        let nearest = route.nearest_indices(0.01, 0.0, 3);
        assert_eq!(nearest.len(), 3);
    }
}
