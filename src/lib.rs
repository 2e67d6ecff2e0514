//! # Raceline Core
//!
//! The real-time location-correction and ranking core of a running-event
//! tracking service. A stream of raw GPS samples from participants is
//! ingested per event, denoised, snapped onto a pre-computed route,
//! evaluated for checkpoint crossings, and fed into a live leaderboard.
//!
//! This library provides:
//! - GPX route loading, densification, and checkpoint classification
//! - 3-axis Kalman-filtered GPS correction
//! - Map matching onto a known course
//! - Checkpoint crossing detection and segment/cumulative timing
//! - A live leaderboard ordered by furthest checkpoint then fastest time
//!
//! ## Quick Start
//!
//! ```rust
//! use raceline_core::config::PipelineConfig;
//! use raceline_core::route::RouteStore;
//! use raceline_core::pipeline::{CorrectionPipeline, CorrectionRequest, GpsSample, TimestampValue};
//! use std::sync::Arc;
//!
//! # async fn run() -> raceline_core::error::Result<()> {
//! let routes = Arc::new(RouteStore::default());
//! let pipeline = CorrectionPipeline::new(PipelineConfig::default(), routes);
//!
//! let request = CorrectionRequest {
//!     user_id: 1,
//!     event_id: 1,
//!     event_detail_id: 1,
//!     gps_data: vec![GpsSample {
//!         lat: 51.5074,
//!         lng: -0.1278,
//!         altitude: None,
//!         accuracy: Some(5.0),
//!         speed: Some(2.0),
//!         heading: None,
//!         timestamp: TimestampValue::Numeric(1_700_000_000),
//!     }],
//!     event_start_time_sec: Some(1_700_000_000),
//! };
//!
//! let response = pipeline.correct(request, 1_700_000_100).await?;
//! println!("corrected: {}, {}", response.latitude, response.longitude);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod geo;
pub mod kalman;
pub mod leaderboard;
pub mod location;
pub mod matcher;
pub mod pipeline;
pub mod route;
pub mod segment_timer;
pub mod storage;

pub use checkpoint::{Crossing, PreviousPosition};
pub use config::PipelineConfig;
pub use error::{CoreError, OptionExt, Result};
pub use geo::{Bounds, GeoPoint};
pub use kalman::{derive_confidence, KalmanFilter3D};
pub use location::ParticipantLocation;
pub use matcher::MatchResult;
pub use pipeline::{CorrectionPipeline, CorrectionRequest, CorrectionResponse, GpsSample, TimestampValue};
pub use route::{Route, RouteStore};
