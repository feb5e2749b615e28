//! Orchestration: from matched events to the canonical enriched table.
//!
//! The resolver ties the pipeline together. For every event with a geotrack
//! it obtains reduced points through the cache, derives the distance and the
//! nearest-station endpoints, patches remaining holes from the manual
//! overrides, and persists the table in one staged write. Events without a
//! geotrack keep their explicit marker and empty derived fields.
//!
//! Single-instance, single-threaded batch discipline: concurrent invocations
//! against the same data directory are unsupported.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::contributors::MatchedEvent;
use crate::error::{AtlasError, Result};
use crate::geo_utils::route_length;
use crate::overrides::ManualOverrides;
use crate::route_cache::RouteCache;
use crate::stations::StationIndex;
use crate::table::{read_table, write_table};
use crate::{HikeDetail, HikeEvent, ResolveConfig};

pub struct HikeDetailsResolver {
    stations: StationIndex,
    cache: RouteCache,
    config: ResolveConfig,
    table_path: PathBuf,
}

impl HikeDetailsResolver {
    /// The geometry tunables are taken from the cache so both sides of the
    /// derivation always run under one [`ResolveConfig`].
    pub fn new(
        stations: StationIndex,
        cache: RouteCache,
        table_path: impl Into<PathBuf>,
    ) -> Self {
        let config = cache.config().clone();
        Self {
            stations,
            cache,
            config,
            table_path: table_path.into(),
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Current canonical table (empty if never built).
    pub fn current_table(&self) -> Result<Vec<HikeDetail>> {
        read_table(&self.table_path)
    }

    /// Build the table from scratch for every matched event, replacing any
    /// prior table. Stale cache entries are evicted up front so every
    /// rebuilt row reflects the latest source file.
    pub fn full_rebuild(
        &self,
        matched: &[MatchedEvent],
        overrides: &ManualOverrides,
    ) -> Result<Vec<HikeDetail>> {
        for m in matched {
            if let Some(track) = &m.geotrack {
                if self.cache.is_stale(&m.event.external_id, track) {
                    self.cache.evict(&m.event.external_id)?;
                }
            }
        }

        let mut rows = Vec::with_capacity(matched.len());
        let mut resolved_count = 0usize;
        for m in matched {
            let row = match &m.geotrack {
                Some(track) => {
                    let row = self.resolve_or_absorb(&m.event, track, overrides)?;
                    if row.geotrack_location.is_some() {
                        resolved_count += 1;
                        if resolved_count % 10 == 0 {
                            log::info!("{resolved_count} hikes resolved");
                        }
                    }
                    row
                }
                None => unresolved_row(&m.event),
            };
            rows.push(row);
        }

        write_table(&self.table_path, &rows)?;
        log::info!("canonical table rebuilt with {} rows", rows.len());
        Ok(rows)
    }

    /// Reconcile the existing table against the current catalog and
    /// geotrack state without discarding unaffected rows.
    ///
    /// Affected rows are those whose cache entry went stale and those that
    /// were unresolved but now have a geotrack; new events with a geotrack
    /// are appended. The singular one-new-track, one-new-event case appends
    /// exactly one row and touches nothing else. The row count never
    /// shrinks.
    pub fn incremental_update(
        &self,
        existing: Vec<HikeDetail>,
        matched: &[MatchedEvent],
        overrides: &ManualOverrides,
    ) -> Result<Vec<HikeDetail>> {
        let by_id: HashMap<&str, &MatchedEvent> = matched
            .iter()
            .map(|m| (m.event.external_id.as_str(), m))
            .collect();

        // Rows absent from the matched set can never be re-derived, so they
        // are kept verbatim rather than classed as affected.
        let affected: HashSet<String> = existing
            .iter()
            .filter(|row| {
                let Some(m) = by_id.get(row.external_id.as_str()) else {
                    return false;
                };
                match &row.geotrack_location {
                    Some(loc) => self.cache.is_stale(&row.external_id, Path::new(loc)),
                    None => m.geotrack.is_some(),
                }
            })
            .map(|row| row.external_id.clone())
            .collect();

        let known: HashSet<&str> = existing.iter().map(|r| r.external_id.as_str()).collect();
        let additions: Vec<&MatchedEvent> = matched
            .iter()
            .filter(|m| m.geotrack.is_some() && !known.contains(m.event.external_id.as_str()))
            .collect();

        if affected.is_empty() && additions.is_empty() {
            log::debug!("incremental update found nothing to do");
            return Ok(existing);
        }

        let mut rows;
        if affected.is_empty() && additions.len() == 1 {
            // The common case after one new upload: append a single fully
            // derived row, leave the rest byte-for-byte alone.
            let m = additions[0];
            let track = m.geotrack.as_ref().expect("additions carry a geotrack");
            rows = existing;
            rows.push(self.resolve_or_absorb(&m.event, track, overrides)?);
            log::info!("appended one new hike: {}", m.event.external_id);
        } else {
            // Scoped recomputation: only affected rows are re-derived, and
            // a re-derivation that fails keeps the previous row rather than
            // degrading it.
            let mut updated = Vec::with_capacity(existing.len() + additions.len());
            for row in existing {
                if !affected.contains(&row.external_id) {
                    updated.push(row);
                    continue;
                }
                let Some(m) = by_id.get(row.external_id.as_str()) else {
                    log::warn!(
                        "{} no longer in the matched set; keeping previous row",
                        row.external_id
                    );
                    updated.push(row);
                    continue;
                };
                match &m.geotrack {
                    Some(track) => match self.resolve_row(&m.event, track, overrides) {
                        Ok(new_row) => updated.push(new_row),
                        Err(AtlasError::TrackParse { path, message }) => {
                            log::warn!(
                                "keeping previous row for {}: {} ({message})",
                                row.external_id,
                                path.display()
                            );
                            updated.push(row);
                        }
                        Err(e) => return Err(e),
                    },
                    None => updated.push(row),
                }
            }
            for m in &additions {
                let track = m.geotrack.as_ref().expect("additions carry a geotrack");
                updated.push(self.resolve_or_absorb(&m.event, track, overrides)?);
            }
            log::info!(
                "incremental update recomputed {} rows, appended {}",
                affected.len(),
                additions.len()
            );
            rows = updated;
        }

        write_table(&self.table_path, &rows)?;
        Ok(rows)
    }

    /// Resolve one event; a parse failure is absorbed into an unresolved
    /// row with a diagnostic, anything else propagates.
    fn resolve_or_absorb(
        &self,
        event: &HikeEvent,
        track: &Path,
        overrides: &ManualOverrides,
    ) -> Result<HikeDetail> {
        match self.resolve_row(event, track, overrides) {
            Ok(row) => Ok(row),
            Err(AtlasError::TrackParse { path, message }) => {
                log::warn!(
                    "leaving {} unresolved: {} ({message})",
                    event.external_id,
                    path.display()
                );
                Ok(unresolved_row(event))
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_row(
        &self,
        event: &HikeEvent,
        track: &Path,
        overrides: &ManualOverrides,
    ) -> Result<HikeDetail> {
        let cached = if self.cache.is_stale(&event.external_id, track) {
            Vec::new()
        } else {
            self.cache.load(&event.external_id)?
        };
        let points = if cached.is_empty() {
            self.cache.reduce_and_cache(track, &event.external_id)?
        } else {
            cached
        };
        if points.is_empty() {
            return Err(AtlasError::track_parse(track, "no track points"));
        }

        let tolerance = self.config.station_tolerance_degrees;
        let start = self
            .stations
            .nearest_station(&points[0], tolerance)
            .map(String::from);
        let end = points
            .last()
            .and_then(|p| self.stations.nearest_station(p, tolerance))
            .map(String::from);

        let mut detail = HikeDetail {
            date: event.date,
            title: event.title.clone(),
            attendees: event.attendees,
            external_id: event.external_id.clone(),
            source: event.source.clone(),
            geotrack_location: Some(track.to_string_lossy().into_owned()),
            start_station: start,
            end_station: end,
            distance_metres: Some(route_length(&points)),
        };
        overrides.fill(&mut detail);

        if detail.start_station.is_none() || detail.end_station.is_none() {
            log::warn!(
                "{} ({}) has no station match within tolerance; candidate for a manual override",
                detail.external_id,
                detail.title
            );
        }
        Ok(detail)
    }
}

fn unresolved_row(event: &HikeEvent) -> HikeDetail {
    HikeDetail {
        date: event.date,
        title: event.title.clone(),
        attendees: event.attendees,
        external_id: event.external_id.clone(),
        source: event.source.clone(),
        geotrack_location: None,
        start_station: None,
        end_station: None,
        distance_metres: None,
    }
}
