//! Open documents

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::content::{header_title, tab_strip_title, ContentItem};

static NEXT_TAB: AtomicU64 = AtomicU64::new(1);

/// Process-unique tab identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Generate a fresh id from the creation time and a monotonic counter
    pub fn generate() -> Self {
        let counter = NEXT_TAB.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        Self(format!("tab-{}-{}", millis, counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Availability of an image asset for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetState {
    Ready(PathBuf),
    /// The archive's assets have not been extracted yet
    Loading,
    Unavailable,
}

/// One open document
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: TabId,
    /// Backing archive, `None` for drafts
    pub file_path: Option<PathBuf>,
    /// Short title for the tab strip
    pub display_title: String,
    /// Longer title for the header readout
    pub full_title: String,
    pub modified: bool,
    pub content: Vec<ContentItem>,
    /// Top-level archive keys this editor does not interpret
    pub metadata: Map<String, Value>,
    /// Assets already stored in the archive on disk, extracted to scratch files
    pub committed_assets: BTreeMap<String, PathBuf>,
    /// Assets only present in the tab's scratch directory
    pub pending_assets: BTreeMap<String, PathBuf>,
    pub assets_loaded: bool,
}

impl Tab {
    /// Create an unsaved draft
    pub fn draft(id: TabId, content: Vec<ContentItem>) -> Self {
        let mut tab = Self {
            id,
            file_path: None,
            display_title: String::new(),
            full_title: String::new(),
            modified: false,
            content,
            metadata: Map::new(),
            committed_assets: BTreeMap::new(),
            pending_assets: BTreeMap::new(),
            assets_loaded: true,
        };
        tab.refresh_titles();
        tab
    }

    /// Create a tab backed by an archive whose assets are not yet extracted
    pub fn from_file(
        id: TabId,
        path: PathBuf,
        content: Vec<ContentItem>,
        metadata: Map<String, Value>,
    ) -> Self {
        let mut tab = Self::draft(id, content);
        tab.file_path = Some(path);
        tab.metadata = metadata;
        tab.assets_loaded = false;
        tab.refresh_titles();
        tab
    }

    pub fn is_draft(&self) -> bool {
        self.file_path.is_none()
    }

    /// Recompute both titles from the path or the content
    pub fn refresh_titles(&mut self) {
        let path = self.file_path.as_deref();
        self.display_title = tab_strip_title(path, &self.content);
        self.full_title = header_title(path, &self.content);
    }

    /// Suggested file name for a save dialog
    pub fn suggested_file_name(&self) -> String {
        match self.file_path.as_deref().and_then(Path::file_name) {
            Some(name) => name.to_string_lossy().to_string(),
            None => format!("{}.txti", sanitize_file_stem(&self.full_title)),
        }
    }

    /// Assets the next save writes into the archive
    pub fn all_assets(&self) -> BTreeMap<String, PathBuf> {
        let mut assets = self.committed_assets.clone();
        assets.extend(self.pending_assets.clone());
        assets
    }

    /// Move every pending asset into the committed map
    pub fn commit_pending_assets(&mut self) {
        let pending = std::mem::take(&mut self.pending_assets);
        self.committed_assets.extend(pending);
    }

    pub fn asset_state(&self, asset_name: &str) -> AssetState {
        if let Some(path) = self
            .pending_assets
            .get(asset_name)
            .or_else(|| self.committed_assets.get(asset_name))
        {
            return AssetState::Ready(path.clone());
        }
        if self.file_path.is_some() && !self.assets_loaded {
            AssetState::Loading
        } else {
            AssetState::Unavailable
        }
    }
}

fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .trim_end_matches("...")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        super::content::UNTITLED.to_string()
    } else {
        cleaned.to_string()
    }
}
