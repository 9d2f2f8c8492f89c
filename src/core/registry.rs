//! Runtime collection of open tabs
//!
//! The registry owns every [`Tab`], their display order and the active tab.
//! It drives the archive codec, the temporary asset store and the session
//! store, and talks to the UI only through [`ContentSurface`] and
//! [`UserPrompts`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::archive;
use super::assets::TempAssetStore;
use super::content::ContentItem;
use super::debounce::{Debouncer, DEFAULT_DELAY};
use super::error::TabError;
use super::host::{ContentSurface, UnsavedChoice, UserPrompts};
use super::session::{PersistedTab, SessionSnapshot, SessionStore};
use super::tab::{Tab, TabId};

/// Result of a save request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// The user declined to pick a destination
    Cancelled,
}

/// Result of a close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    Cancelled,
}

/// Where a startup restore got its tabs from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Snapshot,
    Legacy,
    Fresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub source: RestoreSource,
    pub restored: usize,
    /// Legacy paths that could not be reopened, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// What the next debounced session write has to cover
#[derive(Debug, Clone, PartialEq, Eq)]
enum PersistScope {
    Tab(TabId),
    Full,
}

impl PersistScope {
    fn merge(self, other: PersistScope) -> PersistScope {
        match (self, other) {
            (PersistScope::Tab(a), PersistScope::Tab(b)) if a == b => PersistScope::Tab(a),
            _ => PersistScope::Full,
        }
    }
}

/// Session snapshot whose pending asset bytes are still on disk
struct SnapshotPlan {
    tabs: Vec<(PersistedTab, Vec<String>)>,
    tab_order: Vec<TabId>,
    active_tab_id: Option<TabId>,
}

impl SnapshotPlan {
    async fn materialize(self, assets: &TempAssetStore) -> SessionSnapshot {
        let mut tabs = Vec::with_capacity(self.tabs.len());
        for (mut view, pending) in self.tabs {
            if !pending.is_empty() {
                view.pending_assets = assets.read_assets_as_base64(&view.id, &pending).await;
            }
            tabs.push(view);
        }
        SessionSnapshot {
            tabs,
            tab_order: self.tab_order,
            active_tab_id: self.active_tab_id,
            saved_at: 0,
        }
    }
}

fn persisted_view(tab: &Tab) -> (PersistedTab, Vec<String>) {
    let view = PersistedTab {
        id: tab.id.clone(),
        file_path: tab.file_path.clone(),
        title: tab.display_title.clone(),
        full_title: tab.full_title.clone(),
        modified: tab.modified,
        content: tab.content.clone(),
        metadata: tab.metadata.clone(),
        pending_assets: BTreeMap::new(),
    };
    (view, tab.pending_assets.keys().cloned().collect())
}

async fn normalize(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

fn with_document_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(archive::EXTENSION)
    }
}

/// Open tabs of one window
pub struct TabRegistry {
    tabs: HashMap<TabId, Tab>,
    order: Vec<TabId>,
    active: Option<TabId>,
    assets: TempAssetStore,
    sessions: SessionStore,
    persist: Debouncer,
    persist_scope: PersistScope,
    surface: Box<dyn ContentSurface>,
    prompts: Box<dyn UserPrompts>,
}

impl TabRegistry {
    /// Create an empty registry; must be called inside a tokio runtime
    pub fn new(
        assets: TempAssetStore,
        sessions: SessionStore,
        surface: Box<dyn ContentSurface>,
        prompts: Box<dyn UserPrompts>,
    ) -> Self {
        Self {
            tabs: HashMap::new(),
            order: Vec::new(),
            active: None,
            assets,
            sessions,
            persist: Debouncer::new(DEFAULT_DELAY),
            persist_scope: PersistScope::Full,
            surface,
            prompts,
        }
    }

    /// Change the quiet period of debounced session writes
    #[cfg(test)]
    pub fn with_persist_delay(mut self, delay: std::time::Duration) -> Self {
        self.persist = Debouncer::new(delay);
        self
    }

    pub fn tab(&self, id: &TabId) -> Option<&Tab> {
        self.tabs.get(id)
    }

    /// Tabs in display order
    pub fn tabs(&self) -> impl Iterator<Item = &Tab> {
        self.order.iter().filter_map(|id| self.tabs.get(id))
    }

    #[cfg(test)]
    pub fn tab_order(&self) -> &[TabId] {
        &self.order
    }

    pub fn active_id(&self) -> Option<&TabId> {
        self.active.as_ref()
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.as_ref().and_then(|id| self.tabs.get(id))
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Tabs with unsaved changes, in display order
    pub fn dirty_tabs(&self) -> Vec<TabId> {
        self.tabs()
            .filter(|tab| tab.modified)
            .map(|tab| tab.id.clone())
            .collect()
    }

    pub fn prompts(&self) -> &dyn UserPrompts {
        self.prompts.as_ref()
    }

    fn find_by_path(&self, path: &Path) -> Option<TabId> {
        self.tabs()
            .find(|tab| tab.file_path.as_deref() == Some(path))
            .map(|tab| tab.id.clone())
    }

    fn require(&self, id: &TabId) -> Result<(), TabError> {
        if self.tabs.contains_key(id) {
            Ok(())
        } else {
            Err(TabError::NotFound(id.clone()))
        }
    }

    fn render(&self, id: &TabId) {
        if let Some(tab) = self.tabs.get(id) {
            self.surface.render_content(tab);
        }
    }

    fn insert(&mut self, tab: Tab) {
        let id = tab.id.clone();
        self.tabs.insert(id.clone(), tab);
        self.order.push(id.clone());
        self.surface.notify_tab_changed(&id);
    }

    /// Copy the surface's content for `id` into the tab.
    ///
    /// Returns whether anything changed.
    fn absorb_live_content(&mut self, id: &TabId) -> bool {
        let Some(live) = self.surface.serialize_visible_content(id) else {
            return false;
        };
        let Some(tab) = self.tabs.get_mut(id) else {
            return false;
        };
        if tab.content == live {
            return false;
        }
        tab.content = live;
        tab.modified = true;
        tab.refresh_titles();
        self.surface.notify_tab_changed(id);
        true
    }

    /// Capture the active tab's on-screen content
    pub fn sync_active(&mut self) -> bool {
        match self.active.clone() {
            Some(id) => {
                let changed = self.absorb_live_content(&id);
                if changed {
                    self.schedule_persist(PersistScope::Tab(id));
                }
                changed
            }
            None => false,
        }
    }

    fn snapshot_plan(&self) -> SnapshotPlan {
        SnapshotPlan {
            tabs: self.tabs().map(persisted_view).collect(),
            tab_order: self.order.clone(),
            active_tab_id: self.active.clone(),
        }
    }

    fn schedule_persist(&mut self, requested: PersistScope) {
        let scope = if self.persist.has_pending() {
            self.persist_scope.clone().merge(requested)
        } else {
            requested
        };
        self.persist_scope = scope.clone();

        let assets = self.assets.clone();
        let sessions = self.sessions.clone();
        match scope {
            PersistScope::Tab(id) if self.tabs.contains_key(&id) => {
                let (mut view, pending) = persisted_view(&self.tabs[&id]);
                self.persist.schedule(async move {
                    if !pending.is_empty() {
                        view.pending_assets = assets.read_assets_as_base64(&view.id, &pending).await;
                    }
                    sessions.save_tab_incremental(&view);
                });
            }
            _ => {
                self.persist_scope = PersistScope::Full;
                let plan = self.snapshot_plan();
                self.persist.schedule(async move {
                    let snapshot = plan.materialize(&assets).await;
                    sessions.save_full(&snapshot);
                });
            }
        }
    }

    /// Current state as a session snapshot, pending assets included
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_plan().materialize(&self.assets).await
    }

    /// Open a new draft and make it active
    pub async fn create_tab(&mut self, seed: Option<Vec<ContentItem>>) -> Result<TabId, TabError> {
        let id = TabId::generate();
        self.assets.allocate(&id).await?;
        self.insert(Tab::draft(id.clone(), seed.unwrap_or_default()));
        tracing::debug!("Created tab {}", id);
        self.switch_to(&id).await?;
        Ok(id)
    }

    /// Open the archive at `path`, or activate the tab that already shows it
    pub async fn open(&mut self, path: &Path) -> Result<TabId, TabError> {
        let path = normalize(path).await;
        if let Some(existing) = self.find_by_path(&path) {
            self.switch_to(&existing).await?;
            return Ok(existing);
        }

        let contents = archive::read_structured_content(&path).await?;
        let asset_count = contents.asset_names.len();
        let id = TabId::generate();
        self.assets.allocate(&id).await?;
        self.insert(Tab::from_file(
            id.clone(),
            path.clone(),
            contents.content,
            contents.metadata,
        ));
        tracing::info!("Opened document: {} ({} assets)", path.display(), asset_count);
        self.switch_to(&id).await?;
        Ok(id)
    }

    /// Make `id` the active tab
    pub async fn switch_to(&mut self, id: &TabId) -> Result<(), TabError> {
        self.require(id)?;
        if self.active.as_ref() == Some(id) {
            return Ok(());
        }

        if let Some(outgoing) = self.active.clone() {
            self.absorb_live_content(&outgoing);
        }
        self.active = Some(id.clone());
        self.render(id);
        self.ensure_assets_loaded(id).await;
        self.schedule_persist(PersistScope::Full);
        Ok(())
    }

    /// Extract the archive's assets the first time they are needed.
    ///
    /// The active tab is rendered again once they are available.
    async fn ensure_assets_loaded(&mut self, id: &TabId) {
        let path = match self.tabs.get(id) {
            Some(tab) if !tab.assets_loaded => match &tab.file_path {
                Some(path) => path.clone(),
                None => return,
            },
            _ => return,
        };

        let dest = self.assets.archive_dir(id);
        let extracted = match archive::extract_assets(&path, &dest).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!("Assets of {} are unavailable: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        if let Some(tab) = self.tabs.get_mut(id) {
            for (name, asset_path) in extracted {
                if !tab.pending_assets.contains_key(&name) {
                    tab.committed_assets.insert(name, asset_path);
                }
            }
            tab.assets_loaded = true;
        }
        if self.active.as_ref() == Some(id) {
            self.render(id);
        }
    }

    /// Pick up an edit made on the surface
    pub fn edit(&mut self, id: &TabId) -> Result<bool, TabError> {
        self.require(id)?;
        let changed = self.absorb_live_content(id);
        if changed {
            self.schedule_persist(PersistScope::Tab(id.clone()));
        }
        Ok(changed)
    }

    /// Replace a tab's content programmatically
    #[allow(dead_code)]
    pub fn replace_content(&mut self, id: &TabId, content: Vec<ContentItem>) -> Result<(), TabError> {
        let tab = self
            .tabs
            .get_mut(id)
            .ok_or_else(|| TabError::NotFound(id.clone()))?;
        if tab.content == content {
            return Ok(());
        }
        tab.content = content;
        tab.modified = true;
        tab.refresh_titles();

        self.surface.notify_tab_changed(id);
        if self.active.as_ref() == Some(id) {
            self.render(id);
        }
        self.schedule_persist(PersistScope::Tab(id.clone()));
        Ok(())
    }

    /// Store pasted image bytes as a pending asset and return its name.
    ///
    /// The caller places the matching image item into the content.
    pub async fn paste_image(&mut self, id: &TabId, bytes: &[u8]) -> Result<String, TabError> {
        self.require(id)?;
        let stored = self.assets.write_asset(id, bytes).await?;

        if let Some(tab) = self.tabs.get_mut(id) {
            tab.committed_assets.remove(&stored.asset_name);
            tab.pending_assets
                .insert(stored.asset_name.clone(), stored.path);
            tab.modified = true;
        }
        self.surface.notify_tab_changed(id);
        self.schedule_persist(PersistScope::Tab(id.clone()));
        Ok(stored.asset_name)
    }

    /// Save to the tab's file, asking for a path if it is a draft
    pub async fn save(&mut self, id: &TabId) -> Result<SaveOutcome, TabError> {
        self.save_with(id, false).await
    }

    /// Save to a newly chosen path
    pub async fn save_as(&mut self, id: &TabId) -> Result<SaveOutcome, TabError> {
        self.save_with(id, true).await
    }

    async fn save_with(&mut self, id: &TabId, choose_path: bool) -> Result<SaveOutcome, TabError> {
        self.require(id)?;
        if self.active.as_ref() == Some(id) {
            self.absorb_live_content(id);
        }

        let current = self.tabs[id].file_path.clone();
        let target = match current {
            Some(path) if !choose_path => path,
            _ => {
                let suggested = self.tabs[id].suggested_file_name();
                match self.prompts.prompt_save_path(&suggested) {
                    Some(path) => with_document_extension(path),
                    None => {
                        tracing::debug!("Save of {} cancelled", id);
                        return Ok(SaveOutcome::Cancelled);
                    }
                }
            }
        };

        // One file backs at most one tab
        let holder = self
            .find_by_path(&normalize(&target).await)
            .filter(|other| other != id);
        if let Some(other) = &holder {
            if self.tabs[other].modified {
                tracing::warn!("Refusing to save {} over unsaved tab {}", id, other);
                return Err(TabError::PathInUse(target));
            }
        }

        // The archive is rewritten whole, so its own assets must be on disk first
        self.ensure_assets_loaded(id).await;

        let tab = &self.tabs[id];
        let report =
            archive::write_archive(&tab.content, &tab.metadata, &tab.all_assets(), &target).await?;
        if !report.skipped.is_empty() {
            tracing::warn!(
                "Saved tab {} with {} of {} assets; missing: {}",
                id,
                report.written,
                report.written + report.skipped.len(),
                report.skipped.join(", ")
            );
        }

        if let Some(other) = holder {
            tracing::info!("Closing tab {} replaced by save of {}", other, id);
            self.remove_tab(&other).await;
        }

        let target = normalize(&target).await;
        if let Some(tab) = self.tabs.get_mut(id) {
            tab.file_path = Some(target.clone());
            tab.modified = false;
            tab.assets_loaded = true;
            tab.commit_pending_assets();
            tab.refresh_titles();
        }
        self.surface.notify_tab_changed(id);
        self.schedule_persist(PersistScope::Full);
        Ok(SaveOutcome::Saved(target))
    }

    /// Close a tab, asking about unsaved changes first
    pub async fn close(&mut self, id: &TabId) -> Result<CloseOutcome, TabError> {
        self.require(id)?;
        if self.active.as_ref() == Some(id) {
            self.absorb_live_content(id);
        }

        if self.tabs[id].modified {
            let title = self.tabs[id].full_title.clone();
            match self.prompts.prompt_unsaved_changes(&title) {
                UnsavedChoice::Cancel => return Ok(CloseOutcome::Cancelled),
                UnsavedChoice::Discard => {}
                UnsavedChoice::Save => {
                    if self.save(id).await? == SaveOutcome::Cancelled {
                        return Ok(CloseOutcome::Cancelled);
                    }
                }
            }
        }

        self.remove_tab(id).await;
        self.schedule_persist(PersistScope::Full);
        Ok(CloseOutcome::Closed)
    }

    async fn remove_tab(&mut self, id: &TabId) {
        self.assets.release(id).await;
        let position = self.order.iter().position(|t| t == id);
        self.tabs.remove(id);
        self.order.retain(|t| t != id);
        self.surface.forget_tab(id);
        tracing::debug!("Removed tab {}", id);

        if self.active.as_ref() != Some(id) {
            return;
        }
        self.active = None;
        let next = position
            .map(|p| p.min(self.order.len().saturating_sub(1)))
            .and_then(|p| self.order.get(p))
            .cloned();
        match next {
            Some(next) => {
                if let Err(e) = self.switch_to(&next).await {
                    tracing::warn!("Failed to activate tab {}: {}", next, e);
                }
            }
            None => self.surface.show_empty(),
        }
    }

    /// Drop every tab with unsaved changes without asking
    pub async fn discard_dirty(&mut self) {
        self.sync_active();
        for id in self.dirty_tabs() {
            tracing::info!("Discarding unsaved changes in tab {}", id);
            self.remove_tab(&id).await;
        }
        self.schedule_persist(PersistScope::Full);
    }

    /// Move a tab to `index` in the display order
    pub fn move_tab(&mut self, id: &TabId, index: usize) -> Result<(), TabError> {
        let from = self
            .order
            .iter()
            .position(|t| t == id)
            .ok_or_else(|| TabError::NotFound(id.clone()))?;
        let moved = self.order.remove(from);
        let index = index.min(self.order.len());
        self.order.insert(index, moved);
        self.surface.notify_tab_changed(id);
        self.schedule_persist(PersistScope::Full);
        Ok(())
    }

    /// Activate the next (or previous) tab, wrapping around
    pub async fn cycle(&mut self, forward: bool) -> Result<(), TabError> {
        let len = self.order.len();
        if len == 0 {
            return Ok(());
        }
        let current = self
            .active
            .as_ref()
            .and_then(|id| self.order.iter().position(|t| t == id));
        let next = match (current, forward) {
            (None, _) => 0,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        let id = self.order[next].clone();
        self.switch_to(&id).await
    }

    /// Rebuild tabs from the session store, falling back to the legacy
    /// path list and finally to one blank tab
    pub async fn restore_session(&mut self) -> Result<RestoreReport, TabError> {
        if let Some(snapshot) = self.sessions.load_full() {
            if !snapshot.tabs.is_empty() {
                return self.restore_snapshot(snapshot).await;
            }
        }

        let legacy = self.sessions.load_legacy();
        let mut report = RestoreReport {
            source: if legacy.is_empty() {
                RestoreSource::Fresh
            } else {
                RestoreSource::Legacy
            },
            restored: 0,
            failed: Vec::new(),
        };
        for path in legacy {
            match self.open(&path).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    tracing::warn!("Could not reopen {}: {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        if self.tabs.is_empty() {
            self.create_tab(None).await?;
        }
        Ok(report)
    }

    async fn restore_snapshot(&mut self, snapshot: SessionSnapshot) -> Result<RestoreReport, TabError> {
        let mut restored_ids = Vec::new();
        for persisted in snapshot.tabs {
            let id = persisted.id;
            if self.tabs.contains_key(&id) {
                continue;
            }
            if let Err(e) = self.assets.allocate(&id).await {
                tracing::warn!("Skipping restored tab {}: {}", id, e);
                continue;
            }
            let pending = if persisted.pending_assets.is_empty() {
                BTreeMap::new()
            } else {
                self.assets
                    .restore_assets_from_base64(&id, &persisted.pending_assets)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Pending assets of tab {} lost: {}", id, e);
                        BTreeMap::new()
                    })
            };

            let mut tab = Tab::draft(id.clone(), persisted.content);
            tab.assets_loaded = persisted.file_path.is_none();
            tab.file_path = persisted.file_path;
            tab.metadata = persisted.metadata;
            tab.modified = persisted.modified;
            tab.pending_assets = pending;
            tab.refresh_titles();
            self.tabs.insert(id.clone(), tab);
            restored_ids.push(id);
        }

        // Keep the saved order for known ids, then append anything it missed
        let restored: HashSet<&TabId> = restored_ids.iter().collect();
        let mut seen = HashSet::new();
        let mut order: Vec<TabId> = snapshot
            .tab_order
            .into_iter()
            .filter(|id| restored.contains(id) && seen.insert(id.clone()))
            .collect();
        for id in &restored_ids {
            if seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }
        for id in &order {
            self.surface.notify_tab_changed(id);
        }
        self.order.extend(order);

        let active = snapshot
            .active_tab_id
            .filter(|id| restored.contains(id))
            .or_else(|| self.order.first().cloned());
        if let Some(active) = active {
            self.switch_to(&active).await?;
        }

        tracing::info!("Restored {} tabs from session", restored_ids.len());
        Ok(RestoreReport {
            source: RestoreSource::Snapshot,
            restored: restored_ids.len(),
            failed: Vec::new(),
        })
    }

    /// Persist the final state and remove every scratch directory
    pub async fn shutdown(&mut self) {
        self.sync_active();
        self.persist.flush_now().await;
        let snapshot = self.snapshot().await;
        self.sessions.save_full(&snapshot);

        for id in self.order.clone() {
            self.assets.release(&id).await;
        }
        self.assets.sweep().await;
        tracing::info!("Session engine shut down with {} tabs", self.tabs.len());
    }
}
