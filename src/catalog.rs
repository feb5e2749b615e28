//! Merged, deduplicated event catalog.
//!
//! Three heterogeneous sources feed the catalog: the frozen text capture of
//! the original past-events scrape, a manually curated table, and the
//! accumulating table written by later automated re-scrapes. Identity is the
//! opaque nine-digit external id; the first occurrence of an id wins and the
//! merged set is chronologically ordered.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AtlasError, Result};
use crate::table::stage_write;
use crate::{HikeDetail, HikeEvent};

/// The two capture dates known to sit one day early because of a
/// daylight-saving artifact on the source site. Fixed and enumerable, not a
/// general rule; both shift forward by one day during parsing.
const SHIFTED_CAPTURE_DATES: [(i32, u32, u32); 2] = [(2022, 11, 4), (2023, 10, 27)];

static CAPTURE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]{3}, ([A-Za-z]{3} \d{1,2}, \d{4})").expect("valid pattern"));
static CAPTURE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(.+)\nThis event has passed").expect("valid pattern"));
static CAPTURE_ATTENDEES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) attendees,").expect("valid pattern"));
static CAPTURE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{9}").expect("valid pattern"));

pub struct EventCatalog {
    historic_capture: PathBuf,
    manual_events: PathBuf,
    scraped_events: PathBuf,
}

impl EventCatalog {
    pub fn new(
        historic_capture: impl Into<PathBuf>,
        manual_events: impl Into<PathBuf>,
        scraped_events: impl Into<PathBuf>,
    ) -> Self {
        Self {
            historic_capture: historic_capture.into(),
            manual_events: manual_events.into(),
            scraped_events: scraped_events.into(),
        }
    }

    /// Every known event, deduplicated by external id and ordered by date.
    ///
    /// Idempotent: re-running after a scrape that found nothing new returns
    /// an identical set.
    pub fn all_events(&self) -> Result<Vec<HikeEvent>> {
        let text = fs::read_to_string(&self.historic_capture)
            .map_err(|e| AtlasError::io(&self.historic_capture, e))?;
        let mut events = parse_historic_capture(&text, "Free");
        events.extend(read_events_csv(&self.manual_events)?);
        events.extend(read_events_csv(&self.scraped_events)?);

        let mut seen = HashSet::new();
        events.retain(|e| seen.insert(e.external_id.clone()));
        events.sort_by_key(|e| e.date);

        log::debug!("catalog holds {} events", events.len());
        Ok(events)
    }

    /// Append freshly scraped events to the accumulator, keeping only those
    /// whose external id has not been recorded before. Returns how many were
    /// added.
    pub fn append_scraped(&self, fresh: &[HikeEvent]) -> Result<usize> {
        let existing = read_events_csv(&self.scraped_events)?;
        let known: HashSet<&str> = existing.iter().map(|e| e.external_id.as_str()).collect();

        let mut additions: Vec<HikeEvent> = fresh
            .iter()
            .filter(|e| !known.contains(e.external_id.as_str()))
            .cloned()
            .collect();
        if additions.is_empty() {
            return Ok(0);
        }
        additions.sort_by_key(|e| e.date);

        let added = additions.len();
        let mut all = existing;
        all.extend(additions);
        write_events_csv(&self.scraped_events, &all)?;

        log::info!("recorded {added} newly scraped events");
        Ok(added)
    }
}

/// Parse the frozen historic-capture text into events.
///
/// Each event block starts with a `Ddd, Mmm D, YYYY` date line; the title,
/// attendee count and nine-digit id are pulled from the text that follows.
/// A block missing any of those fields is skipped with a diagnostic.
pub fn parse_historic_capture(text: &str, source: &str) -> Vec<HikeEvent> {
    let mut events = Vec::new();
    for m in CAPTURE_DATE.find_iter(text) {
        let block = &text[m.start()..];
        let Some(date) = CAPTURE_DATE
            .captures(block)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%b %d, %Y").ok())
        else {
            continue;
        };
        let date = correct_capture_date(date);

        let title = CAPTURE_TITLE.captures(block).map(|c| c[1].to_string());
        let attendees = CAPTURE_ATTENDEES
            .captures(block)
            .and_then(|c| c[1].parse::<u32>().ok());
        let external_id = CAPTURE_ID.find(block).map(|m| m.as_str().to_string());

        match (title, attendees, external_id) {
            (Some(title), Some(attendees), Some(external_id)) => events.push(HikeEvent {
                date,
                title,
                attendees,
                external_id,
                source: source.to_string(),
            }),
            _ => log::warn!("skipping malformed capture block dated {date}"),
        }
    }
    events
}

fn correct_capture_date(date: NaiveDate) -> NaiveDate {
    let shifted = SHIFTED_CAPTURE_DATES
        .iter()
        .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date));
    if shifted {
        date.checked_add_days(Days::new(1)).unwrap_or(date)
    } else {
        date
    }
}

/// Events from the catalog with no resolved geotrack in the table: the gap
/// listing reported after a rebuild.
pub fn events_missing_route<'a>(
    events: &'a [HikeEvent],
    table: &[HikeDetail],
) -> Vec<&'a HikeEvent> {
    let resolved: HashSet<&str> = table
        .iter()
        .filter(|d| d.geotrack_location.is_some())
        .map(|d| d.external_id.as_str())
        .collect();
    events
        .iter()
        .filter(|e| !resolved.contains(e.external_id.as_str()))
        .collect()
}

fn read_events_csv(path: &Path) -> Result<Vec<HikeEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| AtlasError::table(path, e.to_string()))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| AtlasError::table(path, e.to_string())))
        .collect()
}

fn write_events_csv(path: &Path, events: &[HikeEvent]) -> Result<()> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        for event in events {
            writer
                .serialize(event)
                .map_err(|e| AtlasError::table(path, e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| AtlasError::io(path, e))?;
    }
    stage_write(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_block(date_line: &str, title: &str, attendees: u32, id: &str) -> String {
        format!("{date_line}\n{title}\nThis event has passed\n{attendees} attendees,\n/events/{id}/\n\n")
    }

    fn sample_capture() -> String {
        let mut text = String::new();
        text += &capture_block("Sun, Jan 13, 2019", "The only moat in Middlesex", 14, "257894101");
        text += &capture_block("Fri, Nov 4, 2022", "Firework night special", 22, "289145202");
        text += &capture_block("Fri, Oct 27, 2023", "Autumn colours loop", 18, "296701303");
        text
    }

    #[test]
    fn test_parse_historic_capture() {
        let events = parse_historic_capture(&sample_capture(), "Free");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].title, "The only moat in Middlesex");
        assert_eq!(events[0].attendees, 14);
        assert_eq!(events[0].external_id, "257894101");
        assert_eq!(events[0].source, "Free");
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2019, 1, 13).unwrap());
    }

    #[test]
    fn test_capture_date_shift_correction() {
        let events = parse_historic_capture(&sample_capture(), "Free");
        let dates: Vec<NaiveDate> = events.iter().map(|e| e.date).collect();

        // Shifted forward one day; the unshifted dates appear nowhere.
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2022, 11, 5).unwrap()));
        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2022, 11, 4).unwrap()));
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2023, 10, 28).unwrap()));
        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2023, 10, 27).unwrap()));
    }

    #[test]
    fn test_malformed_capture_block_skipped() {
        let mut text = sample_capture();
        text += "Sat, Feb 2, 2019\nTitle with no passed marker or id\n\n";
        let events = parse_historic_capture(&text, "Free");
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_all_events_dedupes_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("Hikes.txt");
        let manual = dir.path().join("ManualHikes.csv");
        let scraped = dir.path().join("ScrapedHikes.csv");
        fs::write(&capture, sample_capture()).unwrap();
        fs::write(
            &manual,
            "date,title,attendees,external_id,source\n\
             2020-06-07,Added by hand,9,270000004,Manual\n\
             2019-01-13,Duplicate of capture,14,257894101,Manual\n",
        )
        .unwrap();

        let catalog = EventCatalog::new(&capture, &manual, &scraped);
        let events = catalog.all_events().unwrap();

        assert_eq!(events.len(), 4);
        // Capture occurrence of the duplicated id wins.
        let dup = events.iter().find(|e| e.external_id == "257894101").unwrap();
        assert_eq!(dup.source, "Free");
        // Chronological order.
        assert!(events.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn test_append_scraped_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("Hikes.txt");
        let scraped = dir.path().join("ScrapedHikes.csv");
        fs::write(&capture, sample_capture()).unwrap();

        let catalog = EventCatalog::new(&capture, dir.path().join("none.csv"), &scraped);
        let fresh = vec![HikeEvent {
            date: NaiveDate::from_ymd_opt(2024, 4, 14).unwrap(),
            title: "Spring bluebells".to_string(),
            attendees: 25,
            external_id: "299900505".to_string(),
            source: "Free".to_string(),
        }];

        assert_eq!(catalog.append_scraped(&fresh).unwrap(), 1);
        let after_first = catalog.all_events().unwrap();

        // Re-running the same scrape adds nothing and changes nothing.
        assert_eq!(catalog.append_scraped(&fresh).unwrap(), 0);
        assert_eq!(catalog.all_events().unwrap(), after_first);
        assert_eq!(after_first.len(), 4);
    }

    #[test]
    fn test_events_missing_route() {
        let events = parse_historic_capture(&sample_capture(), "Free");
        let table = vec![HikeDetail {
            date: events[0].date,
            title: events[0].title.clone(),
            attendees: events[0].attendees,
            external_id: events[0].external_id.clone(),
            source: "Free".to_string(),
            geotrack_location: Some("gpx/01/walk.gpx".to_string()),
            start_station: Some("Hampton Court".to_string()),
            end_station: Some("Hampton Court".to_string()),
            distance_metres: Some(12_345),
        }];

        let missing = events_missing_route(&events, &table);
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().all(|e| e.external_id != "257894101"));
    }
}
