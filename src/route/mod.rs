//! Route preparation: GPX parsing, densification, checkpoint classification,
//! and the in-memory store the rest of the pipeline reads from.

pub mod densify;
pub mod gpx_parser;
pub mod store;

pub use densify::{PointKind, RoutePoint};
pub use store::{Route, RouteStore};
