//! Station reference set and nearest-station resolution.
//!
//! Hike endpoints are described by the closest named rail or transit station.
//! The reference set holds thousands of stations, so candidates are first
//! narrowed with an R-tree envelope query (a square bounding box around the
//! query point) before any distance is computed; only the survivors are
//! ranked by planar distance.
//!
//! The index is an explicitly constructed immutable value, never ambient
//! state, so tests run against small synthetic sets.

use std::path::Path;

use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;

use crate::error::{AtlasError, Result};
use crate::geo_utils::planar_distance;
use crate::GeoPoint;

/// A named waypoint in the reference set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationRecord {
    #[serde(alias = "station_name")]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl StationRecord {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

impl RTreeObject for StationRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.longitude, self.latitude])
    }
}

/// Spatial index over the immutable station reference set.
#[derive(Debug)]
pub struct StationIndex {
    tree: RTree<StationRecord>,
}

impl StationIndex {
    /// Build an index from an explicit record set.
    pub fn new(records: Vec<StationRecord>) -> Self {
        Self {
            tree: RTree::bulk_load(records),
        }
    }

    /// Load the two origin lists (mainline rail, urban transit) and
    /// concatenate them into one lookup.
    ///
    /// Mainline names carry a " Rail Station" suffix that is stripped here.
    /// A missing or unreadable list is fatal: with no reference set every
    /// endpoint would silently resolve to nothing.
    pub fn from_reference_files(mainline: &Path, urban: &Path) -> Result<Self> {
        let mut records = read_station_list(mainline)?;
        for station in &mut records {
            if let Some(trimmed) = station.name.strip_suffix(" Rail Station") {
                station.name = trimmed.to_string();
            }
        }
        records.extend(read_station_list(urban)?);

        log::debug!("station index loaded with {} records", records.len());
        Ok(Self::new(records))
    }

    /// Number of stations in the reference set.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Name of the station nearest `point`, searching a square box of
    /// `tolerance_degrees` around it.
    ///
    /// `None` is the expected outcome for an endpoint away from any station,
    /// not a fault. Equidistant candidates tie-break on name so the result
    /// is deterministic for identical input.
    pub fn nearest_station(&self, point: &GeoPoint, tolerance_degrees: f64) -> Option<&str> {
        let envelope = AABB::from_corners(
            [
                point.longitude - tolerance_degrees,
                point.latitude - tolerance_degrees,
            ],
            [
                point.longitude + tolerance_degrees,
                point.latitude + tolerance_degrees,
            ],
        );

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .min_by(|a, b| {
                let da = planar_distance(&a.location(), point);
                let db = planar_distance(&b.location(), point);
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|s| s.name.as_str())
    }
}

fn read_station_list(path: &Path) -> Result<Vec<StationRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AtlasError::StationSet(format!("{}: {e}", path.display())))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| AtlasError::StationSet(format!("{}: {e}", path.display()))))
        .collect()
}
