//! Canonical table persistence.
//!
//! One CSV row per enriched hike, in the stable column order consumed by the
//! map renderer: date, title, attendees, external_id, source,
//! geotrack_location, start_station, end_station, distance_metres. Unresolved
//! fields are empty cells.
//!
//! Every write is staged to a sibling temporary file and renamed into place,
//! so a run that dies partway leaves the previous table intact.

use std::fs;
use std::path::Path;

use crate::error::{AtlasError, Result};
use crate::HikeDetail;

/// Read the canonical table. A missing file is an empty table.
pub fn read_table(path: &Path) -> Result<Vec<HikeDetail>> {
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

/// Replace the canonical table with `rows`, staged.
pub fn write_table(path: &Path, rows: &[HikeDetail]) -> Result<()> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| AtlasError::table(path, e.to_string()))?;
        }
        writer.flush().map_err(|e| AtlasError::io(path, e))?;
    }
    stage_write(path, &buf)
}

/// Write `bytes` to a sibling temporary file, then rename over `path`.
pub(crate) fn stage_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let staged = path.with_extension("csv.tmp");
    fs::write(&staged, bytes).map_err(|e| AtlasError::io(&staged, e))?;
    fs::rename(&staged, path).map_err(|e| AtlasError::io(path, e))
}
