//! File-backed cache of reduced route geometry.
//!
//! One `<external_id>.pts` file per hike, holding ordered `latitude,longitude`
//! rows. This is the only module that invokes the raw geotrack parser:
//! everything else sees either a cache hit or the reduced output of
//! [`RouteCache::reduce_and_cache`].
//!
//! Staleness is judged by file modification time against the originating
//! geotrack, with a missing entry counting as timestamp zero. A source copied
//! with an old mtime therefore reads as fresh; that matches the behaviour the
//! canonical table was built with and is kept intentionally.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{AtlasError, Result};
use crate::geo_utils::{reduce_points, reduction_target};
use crate::track::TrackReader;
use crate::{GeoPoint, ResolveConfig};

pub struct RouteCache {
    dir: PathBuf,
    reader: Box<dyn TrackReader>,
    config: ResolveConfig,
}

impl RouteCache {
    /// Open (creating if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>, reader: Box<dyn TrackReader>, config: ResolveConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AtlasError::io(&dir, e))?;
        Ok(Self { dir, reader, config })
    }

    fn entry_path(&self, external_id: &str) -> PathBuf {
        self.dir.join(format!("{external_id}.pts"))
    }

    /// The tunables this cache reduces with; the resolver shares them so the
    /// reduction and station-tolerance settings cannot diverge.
    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// Read the cached points for an id; an absent entry is an empty
    /// sequence, not an error.
    pub fn load(&self, external_id: &str) -> Result<Vec<GeoPoint>> {
        let path = self.entry_path(external_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| AtlasError::table(&path, e.to_string()))?;

        let mut points = Vec::new();
        for row in reader.deserialize::<(f64, f64)>() {
            let (latitude, longitude) = row.map_err(|e| AtlasError::table(&path, e.to_string()))?;
            points.push(GeoPoint::new(latitude, longitude));
        }
        Ok(points)
    }

    /// Persist points for an id, unconditionally replacing any entry.
    ///
    /// The entry is staged to a temporary file and renamed into place so a
    /// failed run never leaves a half-written entry behind.
    pub fn store(&self, external_id: &str, points: &[GeoPoint]) -> Result<()> {
        let path = self.entry_path(external_id);
        let staged = path.with_extension("pts.tmp");

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&staged)
                .map_err(|e| AtlasError::table(&staged, e.to_string()))?;
            for p in points {
                writer
                    .serialize((p.latitude, p.longitude))
                    .map_err(|e| AtlasError::table(&staged, e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| AtlasError::io(&staged, e))?;
        }

        fs::rename(&staged, &path).map_err(|e| AtlasError::io(&path, e))
    }

    /// Whether the entry for `external_id` must be recomputed against the
    /// geotrack at `geotrack_location`.
    ///
    /// A missing entry is always stale. Unreadable timestamps on either side
    /// read as fresh, preserving the mtime semantics described above.
    pub fn is_stale(&self, external_id: &str, geotrack_location: &Path) -> bool {
        let entry_time = match modified(&self.entry_path(external_id)) {
            Some(t) => t,
            None => return true,
        };
        match modified(geotrack_location) {
            Some(source_time) => entry_time < source_time,
            None => false,
        }
    }

    /// Drop the entry for an id, if present.
    pub fn evict(&self, external_id: &str) -> Result<()> {
        let path = self.entry_path(external_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AtlasError::io(&path, e)),
        }
    }

    /// Drop every entry written after `cutoff`. Used by strict rollback to
    /// undo derived state along with the table; returns the eviction count.
    pub fn evict_newer_than(&self, cutoff: SystemTime) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).map_err(|e| AtlasError::io(&self.dir, e))?;
        let mut evicted = 0;
        for entry in entries {
            let entry = entry.map_err(|e| AtlasError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "pts") {
                continue;
            }
            if modified(&path).is_some_and(|t| t > cutoff) {
                fs::remove_file(&path).map_err(|e| AtlasError::io(&path, e))?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Parse the geotrack, reduce it to the bounded sample count, cache the
    /// result under `external_id` and return it.
    ///
    /// Idempotent with respect to cache state: rerunning against an
    /// unchanged source yields a byte-identical entry.
    pub fn reduce_and_cache(
        &self,
        geotrack_location: &Path,
        external_id: &str,
    ) -> Result<Vec<GeoPoint>> {
        let track = self.reader.read_track(geotrack_location)?;
        let target = reduction_target(track.points.len(), &self.config);
        let reduced = reduce_points(&track.points, target);

        log::debug!(
            "cached {} as {} points (raw {})",
            external_id,
            reduced.len(),
            track.points.len()
        );
        self.store(external_id, &reduced)?;
        Ok(reduced)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
