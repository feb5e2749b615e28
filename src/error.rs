//! Unified error handling for the hike-atlas pipeline.
//!
//! Only conditions that would force an inconsistent canonical table are errors
//! here. Expected absences (no geotrack for an event, no station near an
//! endpoint, no manual override) are plain data, never `Err`.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for pipeline operations.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Filesystem failure on a path the batch cannot proceed without.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tabular file (canonical table, snapshot, catalog source) could not
    /// be read or written consistently.
    #[error("malformed table {path}: {message}")]
    Table { path: PathBuf, message: String },

    /// The station reference set is missing or unreadable. Fatal: without it
    /// every endpoint resolution would silently come back empty.
    #[error("station reference set unavailable: {0}")]
    StationSet(String),

    /// Requested snapshot tag does not exist.
    #[error("snapshot {0} not found")]
    SnapshotMissing(String),

    /// A geotrack file could not be parsed. Recoverable at the batch level:
    /// the resolver absorbs this per event and leaves the row unresolved.
    #[error("geotrack {path} could not be parsed: {message}")]
    TrackParse { path: PathBuf, message: String },
}

impl AtlasError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AtlasError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn table(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AtlasError::Table {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn track_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AtlasError::TrackParse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AtlasError>;
