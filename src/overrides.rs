//! Sparse manual corrections for station endpoints.
//!
//! Keyed by external id; present only where the automatic nearest-station
//! match failed or picked the wrong stop. An override fills a hole, it never
//! displaces a successful automatic match.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AtlasError, Result};
use crate::HikeDetail;

#[derive(Debug, Clone, Deserialize)]
struct OverrideRow {
    external_id: String,
    start_station: Option<String>,
    end_station: Option<String>,
}

/// Manual start/end station overrides, keyed by external id.
#[derive(Debug, Default)]
pub struct ManualOverrides {
    by_id: HashMap<String, (Option<String>, Option<String>)>,
}

impl ManualOverrides {
    /// Load from CSV; an absent file is an empty override set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut reader =
            csv::Reader::from_path(path).map_err(|e| AtlasError::table(path, e.to_string()))?;

        let mut by_id = HashMap::new();
        for row in reader.deserialize::<OverrideRow>() {
            let row = row.map_err(|e| AtlasError::table(path, e.to_string()))?;
            by_id.insert(row.external_id, (row.start_station, row.end_station));
        }
        Ok(Self { by_id })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Fill any still-absent station field on `detail` from the override for
    /// its external id. Fields the automatic match resolved are untouched.
    pub fn fill(&self, detail: &mut HikeDetail) {
        let Some((start, end)) = self.by_id.get(&detail.external_id) else {
            return;
        };
        if detail.start_station.is_none() {
            detail.start_station = start.clone();
        }
        if detail.end_station.is_none() {
            detail.end_station = end.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn detail(start: Option<&str>, end: Option<&str>) -> HikeDetail {
        HikeDetail {
            date: NaiveDate::from_ymd_opt(2023, 5, 14).unwrap(),
            title: "Windsor wander".to_string(),
            attendees: 17,
            external_id: "291500101".to_string(),
            source: "Free".to_string(),
            geotrack_location: Some("gpx/01/windsor.gpx".to_string()),
            start_station: start.map(String::from),
            end_station: end.map(String::from),
            distance_metres: Some(18_204),
        }
    }

    fn overrides_from(csv_text: &str) -> ManualOverrides {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ManualStartEnd.csv");
        std::fs::write(&path, csv_text).unwrap();
        ManualOverrides::load(&path).unwrap()
    }

    #[test]
    fn test_fill_only_absent_fields() {
        let overrides = overrides_from(
            "external_id,start_station,end_station\n291500101,Staines,Windsor & Eton Central\n",
        );

        let mut d = detail(Some("Windsor & Eton Riverside"), None);
        overrides.fill(&mut d);

        // Automatic match kept, hole filled.
        assert_eq!(d.start_station.as_deref(), Some("Windsor & Eton Riverside"));
        assert_eq!(d.end_station.as_deref(), Some("Windsor & Eton Central"));
    }

    #[test]
    fn test_no_override_leaves_absence() {
        let overrides = overrides_from("external_id,start_station,end_station\n");
        let mut d = detail(None, None);
        overrides.fill(&mut d);
        assert!(d.start_station.is_none());
        assert!(d.end_station.is_none());
    }

    #[test]
    fn test_absent_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ManualOverrides::load(&dir.path().join("none.csv")).unwrap();
        assert!(overrides.is_empty());
    }
}
