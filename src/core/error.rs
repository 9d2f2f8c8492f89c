//! Error types shared across the session engine

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::tab::TabId;

/// Failures of the archive codec
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid document: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
    #[error("Archive task failed: {0}")]
    Task(String),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the file was readable but is not a `.txti` document
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

/// Failures of the temporary asset store
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset I/O failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Asset {0} is unavailable")]
    Missing(String),
    #[error("Asset {name} has invalid base64 data: {reason}")]
    Decode { name: String, reason: String },
}

impl AssetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by tab registry operations
#[derive(Debug, Error)]
pub enum TabError {
    #[error("No open tab with id {0}")]
    NotFound(TabId),
    #[error("{} is open in another tab with unsaved changes", .0.display())]
    PathInUse(PathBuf),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}
