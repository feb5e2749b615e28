//! Timestamped snapshots of the canonical table, with rollback.
//!
//! Snapshots are plain byte copies of the live table, one file per snapshot,
//! named by UTC creation time. The history is append-only: nothing here ever
//! overwrites or prunes an existing snapshot, and rollback is destructive
//! only to the live table.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;

use crate::error::{AtlasError, Result};
use crate::route_cache::RouteCache;
use crate::table::stage_write;

const SNAPSHOT_PREFIX: &str = "HikeDetails-";

/// What rollback does with route-cache entries written after the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackMode {
    /// Leave cache entries in place (the default semantics).
    KeepDerived,
    /// Also evict cache entries newer than the snapshot, fully undoing
    /// derived state. Must be chosen explicitly, never silently.
    EvictDerived,
}

pub struct SnapshotManager {
    dir: PathBuf,
    table_path: PathBuf,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>, table_path: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AtlasError::io(&dir, e))?;
        Ok(Self {
            dir,
            table_path: table_path.into(),
        })
    }

    fn snapshot_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{tag}.csv"))
    }

    /// Persist a copy of the live canonical table, tagged with the creation
    /// time. Returns the tag.
    pub fn snapshot(&self) -> Result<String> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let mut tag = format!("{SNAPSHOT_PREFIX}{stamp}");
        let mut n = 0;
        while self.snapshot_path(&tag).exists() {
            n += 1;
            tag = format!("{SNAPSHOT_PREFIX}{stamp}-{n}");
        }

        let dest = self.snapshot_path(&tag);
        fs::copy(&self.table_path, &dest).map_err(|e| AtlasError::io(&self.table_path, e))?;
        log::info!("snapshot {tag} written");
        Ok(tag)
    }

    /// Available snapshot tags, newest first.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| AtlasError::io(&self.dir, e))?;
        let mut tags: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_suffix(".csv")
                    .filter(|stem| stem.starts_with(SNAPSHOT_PREFIX))
                    .map(String::from)
            })
            .collect();
        tags.sort_by(|a, b| b.cmp(a));
        Ok(tags)
    }

    /// Replace the live canonical table with the chosen snapshot's contents.
    ///
    /// With [`RollbackMode::EvictDerived`], route-cache entries newer than
    /// the snapshot are swept as well. The snapshot file itself, and all
    /// other snapshots, are left untouched.
    pub fn rollback(&self, tag: &str, mode: RollbackMode, cache: &RouteCache) -> Result<()> {
        let source = self.snapshot_path(tag);
        if !source.exists() {
            return Err(AtlasError::SnapshotMissing(tag.to_string()));
        }

        let bytes = fs::read(&source).map_err(|e| AtlasError::io(&source, e))?;
        stage_write(&self.table_path, &bytes)?;
        log::info!("canonical table rolled back to {tag}");

        if mode == RollbackMode::EvictDerived {
            let cutoff = snapshot_time(&source)?;
            let evicted = cache.evict_newer_than(cutoff)?;
            log::info!("evicted {evicted} cache entries newer than {tag}");
        }
        Ok(())
    }
}

fn snapshot_time(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| AtlasError::io(path, e))
}
