//! Priority-ordered merge of contributor geotrack folders onto the event set.
//!
//! Each contributor owns a numbered sub-folder of the geotrack root. Folders
//! are scanned into per-date listings, then folded onto the events in
//! priority order with a fill-only-where-absent policy: the first contributor
//! to cover a date wins and is never displaced by a later one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{AtlasError, Result};
use crate::track::{filename_date, TrackDateResolver, TrackReader};
use crate::HikeEvent;

/// An event together with the best geotrack found for its date, if any.
#[derive(Debug, Clone)]
pub struct MatchedEvent {
    pub event: HikeEvent,
    /// `None` is the explicit no-geotrack marker; such events are excluded
    /// from geometry derivation downstream.
    pub geotrack: Option<PathBuf>,
}

pub struct ContributorMatcher<'a> {
    root: PathBuf,
    reader: &'a dyn TrackReader,
    date_fallback: &'a dyn TrackDateResolver,
}

impl<'a> ContributorMatcher<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        reader: &'a dyn TrackReader,
        date_fallback: &'a dyn TrackDateResolver,
    ) -> Self {
        Self {
            root: root.into(),
            reader,
            date_fallback,
        }
    }

    /// Contributor ids found under the geotrack root: the numeric sub-folder
    /// names, ascending. Ascending order doubles as the priority order.
    pub fn discover_contributors(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| AtlasError::io(&self.root, e))?;
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Dated listing of one contributor's geotrack files.
    ///
    /// The date comes from the filename pattern where present, else from the
    /// file's embedded metadata, else from the pluggable fallback. Files with
    /// no recoverable date, or that fail to parse, are skipped with a
    /// diagnostic; a single bad upload never sinks the merge. The first file
    /// seen for a date wins within one contributor.
    pub fn tracks_by_date(&self, contributor: &str) -> Result<BTreeMap<NaiveDate, PathBuf>> {
        let folder = self.root.join(contributor);
        let entries = fs::read_dir(&folder).map_err(|e| AtlasError::io(&folder, e))?;

        let mut listing = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| AtlasError::io(&folder, e))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "gpx") {
                continue;
            }

            match self.date_for(&path) {
                Some(date) => {
                    listing.entry(date).or_insert(path);
                }
                None => {
                    log::warn!("skipping undatable geotrack {}", path.display());
                }
            }
        }
        Ok(listing)
    }

    fn date_for(&self, path: &Path) -> Option<NaiveDate> {
        if let Some(date) = filename_date(path) {
            return Some(date);
        }
        // Metadata-only read: the full parse happens once, later, during
        // resolution.
        match self.reader.read_recorded_date(path) {
            Ok(Some(date)) => Some(date),
            Ok(None) => self.date_fallback.resolve_date(path),
            Err(e) => {
                log::warn!("{e}");
                self.date_fallback.resolve_date(path)
            }
        }
    }

    /// Attach the best available geotrack to each event.
    ///
    /// An explicit left-fold over the priority-ordered contributor list:
    /// each contributor's listing fills only dates still unresolved by an
    /// earlier one. A later contributor never overrides an earlier match.
    pub fn merge_sources(
        &self,
        events: &[HikeEvent],
        contributors: &[String],
    ) -> Result<Vec<MatchedEvent>> {
        let combined = contributors.iter().try_fold(
            BTreeMap::new(),
            |mut acc: BTreeMap<NaiveDate, PathBuf>, contributor| {
                for (date, path) in self.tracks_by_date(contributor)? {
                    acc.entry(date).or_insert(path);
                }
                Ok::<_, AtlasError>(acc)
            },
        )?;

        let matched: Vec<MatchedEvent> = events
            .iter()
            .map(|event| MatchedEvent {
                event: event.clone(),
                geotrack: combined.get(&event.date).cloned(),
            })
            .collect();

        let with_track = matched.iter().filter(|m| m.geotrack.is_some()).count();
        log::info!(
            "matched {} of {} events to geotracks across {} contributors",
            with_track,
            events.len(),
            contributors.len()
        );
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{GpxTrackReader, NoPrompt};

    fn gpx_body(lat: f64, lng: f64) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
<trk><trkseg><trkpt lat="{lat}" lon="{lng}"></trkpt><trkpt lat="{}" lon="{}"></trkpt></trkseg></trk></gpx>"#,
            lat + 0.01,
            lng + 0.01
        )
    }

    fn event(date: NaiveDate, id: &str) -> HikeEvent {
        HikeEvent {
            date,
            title: format!("Walk {id}"),
            attendees: 10,
            external_id: id.to_string(),
            source: "Free".to_string(),
        }
    }

    #[test]
    fn test_discover_contributors_numeric_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["02", "01", "10", "notes", "bak-03"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        assert_eq!(matcher.discover_contributors().unwrap(), ["01", "02", "10"]);
    }

    #[test]
    fn test_tracks_by_date_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("01");
        fs::create_dir(&folder).unwrap();
        fs::write(
            folder.join("suuntoapp-Hiking-2023-05-14T09-00-00Z.gpx"),
            gpx_body(51.5, -0.1),
        )
        .unwrap();
        fs::write(folder.join("broken.gpx"), "not xml").unwrap();
        fs::write(folder.join("notes.txt"), "ignored").unwrap();

        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        let listing = matcher.tracks_by_date("01").unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing.contains_key(&NaiveDate::from_ymd_opt(2023, 5, 14).unwrap()));
    }

    #[test]
    fn test_tracks_by_date_falls_back_to_embedded_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("01");
        fs::create_dir(&folder).unwrap();

        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
<metadata><time>2023-05-14T09:00:00Z</time></metadata>
{}"#,
            r#"<trk><trkseg><trkpt lat="51.5" lon="-0.1"></trkpt></trkseg></trk></gpx>"#
        );
        fs::write(folder.join("richmond-loop.gpx"), body).unwrap();

        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        let listing = matcher.tracks_by_date("01").unwrap();
        assert!(listing.contains_key(&NaiveDate::from_ymd_opt(2023, 5, 14).unwrap()));
    }

    #[test]
    fn test_higher_priority_contributor_wins_shared_date() {
        let dir = tempfile::tempdir().unwrap();
        for contributor in ["01", "02"] {
            let folder = dir.path().join(contributor);
            fs::create_dir(&folder).unwrap();
            fs::write(
                folder.join("suuntoapp-Hiking-2023-05-14T09-00-00Z.gpx"),
                gpx_body(51.5, -0.1),
            )
            .unwrap();
        }

        let date = NaiveDate::from_ymd_opt(2023, 5, 14).unwrap();
        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        let matched = matcher
            .merge_sources(
                &[event(date, "100000001")],
                &["01".to_string(), "02".to_string()],
            )
            .unwrap();

        let track = matched[0].geotrack.as_ref().unwrap();
        assert!(track.starts_with(dir.path().join("01")));
    }

    #[test]
    fn test_unmatched_event_keeps_explicit_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("01")).unwrap();

        let date = NaiveDate::from_ymd_opt(2023, 5, 14).unwrap();
        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        let matched = matcher
            .merge_sources(&[event(date, "100000001")], &["01".to_string()])
            .unwrap();
        assert!(matched[0].geotrack.is_none());
    }

    #[test]
    fn test_lower_priority_fills_remaining_gap() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("01");
        let second = dir.path().join("02");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(
            first.join("suuntoapp-Hiking-2023-05-14T09-00-00Z.gpx"),
            gpx_body(51.5, -0.1),
        )
        .unwrap();
        fs::write(
            second.join("suuntoapp-Hiking-2023-05-21T09-00-00Z.gpx"),
            gpx_body(51.6, -0.2),
        )
        .unwrap();

        let matcher = ContributorMatcher::new(dir.path(), &GpxTrackReader, &NoPrompt);
        let matched = matcher
            .merge_sources(
                &[
                    event(NaiveDate::from_ymd_opt(2023, 5, 14).unwrap(), "100000001"),
                    event(NaiveDate::from_ymd_opt(2023, 5, 21).unwrap(), "100000002"),
                ],
                &["01".to_string(), "02".to_string()],
            )
            .unwrap();

        assert!(matched[0].geotrack.as_ref().unwrap().starts_with(&first));
        assert!(matched[1].geotrack.as_ref().unwrap().starts_with(&second));
    }
}
