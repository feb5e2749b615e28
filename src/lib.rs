//! # Hike Atlas
//!
//! Reconciles a catalog of recorded hike events with geotrack files from
//! multiple independent uploaders, producing a single canonical,
//! incrementally-updatable table of enriched hike records (endpoints,
//! distance, matched route geometry) for map rendering.
//!
//! The pipeline, leaf to root:
//! - [`catalog`] merges historic, manual and re-scraped event records into
//!   one deduplicated chronological set
//! - [`contributors`] attaches the best available geotrack to each event
//!   across priority-ordered contributor folders
//! - [`route_cache`] resolves and caches reduced route geometry per event,
//!   with mtime-based staleness detection
//! - [`geo_utils`] and [`stations`] derive total distance and
//!   nearest-station endpoints from that geometry
//! - [`resolver`] merges derived fields onto the events, fills gaps from
//!   manual overrides and persists the canonical table
//! - [`snapshot`] keeps timestamped copies of the table and restores them
//!   on demand
//!
//! Everything runs as a single-threaded synchronous batch; concurrent
//! invocations against one data directory are unsupported.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hike_atlas::{
//!     ContributorMatcher, EventCatalog, GpxTrackReader, HikeDetailsResolver,
//!     ManualOverrides, NoPrompt, ResolveConfig, RouteCache, StationIndex,
//! };
//! use std::path::Path;
//!
//! # fn main() -> hike_atlas::Result<()> {
//! let catalog = EventCatalog::new("Hikes.txt", "ManualHikes.csv", "ScrapedHikes.csv");
//! let events = catalog.all_events()?;
//!
//! let matcher = ContributorMatcher::new("gpx", &GpxTrackReader, &NoPrompt);
//! let contributors = matcher.discover_contributors()?;
//! let matched = matcher.merge_sources(&events, &contributors)?;
//!
//! let stations = StationIndex::from_reference_files(
//!     Path::new("uk-train-stations.csv"),
//!     Path::new("urban-stations.csv"),
//! )?;
//! let cache = RouteCache::new("routes", Box::new(GpxTrackReader), ResolveConfig::default())?;
//! let resolver = HikeDetailsResolver::new(stations, cache, "HikeDetails.csv");
//!
//! let overrides = ManualOverrides::load(Path::new("ManualStartEnd.csv"))?;
//! let table = resolver.full_rebuild(&matched, &overrides)?;
//! println!("{} hikes in the canonical table", table.len());
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{AtlasError, Result};

// Geographic utilities (distance, route length, point reduction)
pub mod geo_utils;
pub use geo_utils::{point_distance, reduce_points, reduction_target, route_length};

// Station reference set and nearest-station resolution
pub mod stations;
pub use stations::{StationIndex, StationRecord};

// Geotrack parser seam
pub mod track;
pub use track::{GpxTrackReader, NoPrompt, ParsedTrack, TrackDateResolver, TrackReader};

// File-backed reduced-route cache
pub mod route_cache;
pub use route_cache::RouteCache;

// Priority-ordered contributor matching
pub mod contributors;
pub use contributors::{ContributorMatcher, MatchedEvent};

// Merged, deduplicated event catalog
pub mod catalog;
pub use catalog::{events_missing_route, parse_historic_capture, EventCatalog};

// Sparse manual station overrides
pub mod overrides;
pub use overrides::ManualOverrides;

// Canonical table persistence
pub mod table;
pub use table::{read_table, write_table};

// Orchestration of the enrichment pipeline
pub mod resolver;
pub use resolver::HikeDetailsResolver;

// Timestamped snapshots and rollback
pub mod snapshot;
pub use snapshot::{RollbackMode, SnapshotManager};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A recorded hike event. Identity is the opaque `external_id`; events are
/// immutable once created and a later scrape only introduces ids not seen
/// before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HikeEvent {
    pub date: NaiveDate,
    pub title: String,
    pub attendees: u32,
    pub external_id: String,
    pub source: String,
}

/// One row of the canonical enriched table: the event fields plus the
/// derived geometry attributes. Optional fields serialize as empty CSV
/// cells; the column order here is the on-disk contract consumed by the map
/// renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HikeDetail {
    pub date: NaiveDate,
    pub title: String,
    pub attendees: u32,
    pub external_id: String,
    pub source: String,
    pub geotrack_location: Option<String>,
    pub start_station: Option<String>,
    pub end_station: Option<String>,
    pub distance_metres: Option<i64>,
}

impl HikeDetail {
    /// Whether every derived field is populated.
    pub fn is_fully_resolved(&self) -> bool {
        self.geotrack_location.is_some()
            && self.start_station.is_some()
            && self.end_station.is_some()
            && self.distance_metres.is_some()
    }
}

/// Tunables for geometry derivation.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Bounded sample count a raw track is reduced to.
    /// Default: 500
    pub reduce_target: usize,

    /// Raw point count above which the reduction target becomes raw / 10
    /// instead, to avoid oversampling error on dense recordings.
    /// Default: 8,000
    pub high_volume_threshold: usize,

    /// Half-width in degrees of the square box used to pre-filter station
    /// candidates around a route endpoint.
    /// Default: 0.05
    pub station_tolerance_degrees: f64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            reduce_target: 500,
            high_volume_threshold: 8_000,
            station_tolerance_degrees: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_detail_resolution_check() {
        let mut d = HikeDetail {
            date: NaiveDate::from_ymd_opt(2023, 5, 14).unwrap(),
            title: "Windsor wander".to_string(),
            attendees: 17,
            external_id: "291500101".to_string(),
            source: "Free".to_string(),
            geotrack_location: Some("gpx/01/windsor.gpx".to_string()),
            start_station: Some("Windsor & Eton Riverside".to_string()),
            end_station: None,
            distance_metres: Some(18_204),
        };
        assert!(!d.is_fully_resolved());
        d.end_station = Some("Datchet".to_string());
        assert!(d.is_fully_resolved());
    }

    #[test]
    fn test_default_config() {
        let config = ResolveConfig::default();
        assert_eq!(config.reduce_target, 500);
        assert_eq!(config.high_volume_threshold, 8_000);
        assert!((config.station_tolerance_degrees - 0.05).abs() < f64::EPSILON);
    }
}
