//! Geotrack parsing seam.
//!
//! The pipeline never touches GPX internals outside this module: everything
//! downstream consumes [`ParsedTrack`] through the [`TrackReader`] trait, so
//! tests (and any future format) can substitute their own reader.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AtlasError, Result};
use crate::GeoPoint;

/// Raw parser output: the ordered point sequence and, when the file carries
/// one, the recorded start date from its embedded metadata.
#[derive(Debug, Clone)]
pub struct ParsedTrack {
    pub points: Vec<GeoPoint>,
    pub recorded: Option<NaiveDate>,
}

/// External-collaborator boundary around the on-disk geotrack parser.
pub trait TrackReader {
    /// Parse the file at `location` into an ordered point sequence.
    ///
    /// Returns [`AtlasError::TrackParse`] for malformed content; callers
    /// treat that as a per-file skip, never a batch failure.
    fn read_track(&self, location: &Path) -> Result<ParsedTrack>;

    /// Recorded date only, without materializing the point sequence.
    ///
    /// Contributor listings date every file up front and the full parse is
    /// repeated later during resolution, so this path should stay cheap.
    /// The default delegates to a full parse.
    fn read_recorded_date(&self, location: &Path) -> Result<Option<NaiveDate>> {
        Ok(self.read_track(location)?.recorded)
    }
}

/// Default reader backed by the `gpx` crate.
///
/// All tracks and segments in the file are flattened in order; contributor
/// exports occasionally split one walk across segments.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpxTrackReader;

impl TrackReader for GpxTrackReader {
    fn read_track(&self, location: &Path) -> Result<ParsedTrack> {
        let file = File::open(location).map_err(|e| AtlasError::io(location, e))?;
        let gpx = gpx::read(BufReader::new(file))
            .map_err(|e| AtlasError::track_parse(location, e.to_string()))?;

        let points: Vec<GeoPoint> = gpx
            .tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .flat_map(|s| s.points.iter())
            .map(|wp| {
                let p = wp.point();
                GeoPoint::new(p.y(), p.x())
            })
            .collect();

        if points.is_empty() {
            return Err(AtlasError::track_parse(location, "no track points"));
        }

        let recorded = gpx
            .metadata
            .as_ref()
            .and_then(|m| m.time.as_ref())
            .and_then(|t| t.format().ok())
            .and_then(|stamp| parse_iso_date_prefix(&stamp));

        Ok(ParsedTrack { points, recorded })
    }

    /// Scans the raw text for the first `<time>` tag instead of parsing the
    /// document. Metadata time precedes any track point time, so the first
    /// tag carries the recording date either way.
    fn read_recorded_date(&self, location: &Path) -> Result<Option<NaiveDate>> {
        let text = fs::read_to_string(location).map_err(|e| AtlasError::io(location, e))?;
        Ok(TIME_TAG
            .captures(&text)
            .and_then(|c| parse_iso_date_prefix(&c[1])))
    }
}

static FILENAME_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid filename date pattern"));

static TIME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<time>([^<]+)</time>").expect("valid time tag pattern"));

/// Extract a `YYYY-MM-DD` date embedded in a file name, if any.
///
/// Watch-app exports (`suuntoapp-2023-05-14T09-00-00…gpx`) carry the
/// recording date this way, which saves opening the file at all.
pub fn filename_date(location: &Path) -> Option<NaiveDate> {
    let name = location.file_name()?.to_str()?;
    let m = FILENAME_DATE.find(name)?;
    NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok()
}

fn parse_iso_date_prefix(stamp: &str) -> Option<NaiveDate> {
    if stamp.len() < 10 {
        return None;
    }
    NaiveDate::parse_from_str(&stamp[..10], "%Y-%m-%d").ok()
}

/// Last-resort date resolution for a geotrack that has neither a filename
/// date nor embedded metadata.
///
/// Interactive disambiguation ("whose upload is this, from which day?") is
/// plugged in here; the unattended default declines, which makes the file
/// skip out of matching rather than block the batch.
pub trait TrackDateResolver {
    fn resolve_date(&self, location: &Path) -> Option<NaiveDate>;
}

/// Unattended default: never resolves, the file is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl TrackDateResolver for NoPrompt {
    fn resolve_date(&self, _location: &Path) -> Option<NaiveDate> {
        None
    }
}
