//! Persistence of the open-tab set across restarts
//!
//! The state file holds one of two shapes: the legacy `{openFiles, savedAt}`
//! list, or a full snapshot with `tabs`, `tabOrder` and `activeTabId`. The
//! presence of `tabs` tells them apart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::content::ContentItem;
use super::fs_util;
use super::tab::TabId;

/// Persisted view of one tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTab {
    pub id: TabId,
    pub file_path: Option<PathBuf>,
    pub title: String,
    pub full_title: String,
    pub modified: bool,
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Base64 bytes of assets not yet written into any archive
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending_assets: BTreeMap<String, String>,
}

/// Full persisted registry state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub tabs: Vec<PersistedTab>,
    pub tab_order: Vec<TabId>,
    pub active_tab_id: Option<TabId>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub saved_at: i64,
}

impl SessionSnapshot {
    /// Insert or replace a tab by id, appending it to the order if new
    pub fn upsert(&mut self, tab: PersistedTab) {
        if !self.tab_order.contains(&tab.id) {
            self.tab_order.push(tab.id.clone());
        }
        match self.tabs.iter_mut().find(|t| t.id == tab.id) {
            Some(existing) => *existing = tab,
            None => self.tabs.push(tab),
        }
    }
}

/// Legacy shape: just the paths of open files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySession {
    pub open_files: Vec<PathBuf>,
    #[serde(default)]
    pub saved_at: i64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owner of the session state file
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store at the platform data location
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "txti", "Txti")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::new(dirs.data_dir().join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_value(&self) -> Option<Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read session {}: {}", self.path.display(), e);
                return None;
            }
        };
        if content.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Failed to parse session {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Paths from the legacy shape; empty on absence or corruption
    pub fn load_legacy(&self) -> Vec<PathBuf> {
        let Some(value) = self.read_value() else {
            return Vec::new();
        };
        if value.get("openFiles").is_none() {
            return Vec::new();
        }
        serde_json::from_value::<LegacySession>(value)
            .map(|legacy| legacy.open_files)
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed legacy session: {}", e);
                Vec::new()
            })
    }

    /// Full snapshot, or `None` when the file is absent, corrupt, or legacy
    pub fn load_full(&self) -> Option<SessionSnapshot> {
        let value = self.read_value()?;
        value.get("tabs")?;
        match serde_json::from_value::<SessionSnapshot>(value) {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded session ({} tabs) from {}",
                    snapshot.tabs.len(),
                    self.path.display()
                );
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed session snapshot: {}", e);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, state: &T) -> bool {
        let bytes = match serde_json::to_vec_pretty(state) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to serialize session: {}", e);
                return false;
            }
        };
        match fs_util::write_atomic(&self.path, &bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write session {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Overwrite the file with `snapshot`, stamping `savedAt`
    pub fn save_full(&self, snapshot: &SessionSnapshot) -> bool {
        let _guard = self.lock();
        let mut stamped = snapshot.clone();
        stamped.saved_at = now_millis();
        let ok = self.write(&stamped);
        if ok {
            tracing::debug!("Saved session with {} tabs", stamped.tabs.len());
        }
        ok
    }

    /// Upsert one tab into the persisted snapshot and rewrite the file
    pub fn save_tab_incremental(&self, tab: &PersistedTab) -> bool {
        let _guard = self.lock();
        let mut snapshot = self.load_full().unwrap_or_default();
        snapshot.upsert(tab.clone());
        snapshot.saved_at = now_millis();
        self.write(&snapshot)
    }

    /// Write the legacy list-of-paths shape
    #[allow(dead_code)]
    pub fn save_legacy(&self, open_files: &[PathBuf]) -> bool {
        let _guard = self.lock();
        self.write(&LegacySession {
            open_files: open_files.to_vec(),
            saved_at: now_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(id: &str, text: &str) -> PersistedTab {
        PersistedTab {
            id: TabId::from(id),
            file_path: None,
            title: text.to_string(),
            full_title: text.to_string(),
            modified: true,
            content: vec![ContentItem::text(text)],
            metadata: Map::new(),
            pending_assets: BTreeMap::new(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("session.json"))
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load_full().is_none());
        assert!(store.load_legacy().is_empty());
    }

    #[test]
    fn test_legacy_shape_is_not_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"openFiles":["/docs/a.txti","/docs/b.txti"],"savedAt":1}"#,
        )
        .unwrap();

        assert!(store.load_full().is_none());
        assert_eq!(
            store.load_legacy(),
            vec![PathBuf::from("/docs/a.txti"), PathBuf::from("/docs/b.txti")]
        );
    }

    #[test]
    fn test_full_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let snapshot = SessionSnapshot {
            tabs: vec![persisted("t1", "one"), persisted("t2", "two")],
            tab_order: vec![TabId::from("t2"), TabId::from("t1")],
            active_tab_id: Some(TabId::from("t1")),
            saved_at: 0,
        };

        assert!(store.save_full(&snapshot));
        let loaded = store.load_full().unwrap();
        assert_eq!(loaded.tabs, snapshot.tabs);
        assert_eq!(loaded.tab_order, snapshot.tab_order);
        assert_eq!(loaded.active_tab_id, snapshot.active_tab_id);
        assert!(loaded.saved_at > 0);
        assert!(store.load_legacy().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"tabs\": [").unwrap();

        assert!(store.load_full().is_none());
        assert!(store.load_legacy().is_empty());
    }

    #[test]
    fn test_incremental_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.save_tab_incremental(&persisted("t1", "first")));
        assert!(store.save_tab_incremental(&persisted("t2", "second")));
        assert!(store.save_tab_incremental(&persisted("t1", "first, edited")));

        let loaded = store.load_full().unwrap();
        assert_eq!(loaded.tabs.len(), 2);
        assert_eq!(loaded.tab_order, vec![TabId::from("t1"), TabId::from("t2")]);
        assert_eq!(loaded.tabs[0].content, vec![ContentItem::text("first, edited")]);
    }

    #[test]
    fn test_incremental_over_legacy_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.save_legacy(&[PathBuf::from("/docs/a.txti")]));

        assert!(store.save_tab_incremental(&persisted("t1", "x")));
        let loaded = store.load_full().unwrap();
        assert_eq!(loaded.tabs.len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let snapshot = SessionSnapshot {
            tabs: vec![persisted("t1", "kept")],
            tab_order: vec![TabId::from("t1")],
            active_tab_id: None,
            saved_at: 0,
        };
        assert!(store.save_full(&snapshot));

        let blocked = SessionStore::new(store.path().join("nested.json"));
        assert!(!blocked.save_full(&SessionSnapshot::default()));
        assert_eq!(store.load_full().unwrap().tabs, snapshot.tabs);
    }
}
