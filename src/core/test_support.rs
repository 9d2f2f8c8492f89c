//! Scripted fakes for the UI collaborators

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use tempfile::TempDir;

use super::assets::TempAssetStore;
use super::content::ContentItem;
use super::host::{ContentSurface, UnsavedChoice, UserPrompts};
use super::registry::TabRegistry;
use super::session::SessionStore;
use super::tab::{AssetState, Tab, TabId};

#[derive(Default)]
pub struct SurfaceState {
    pub live: HashMap<TabId, Vec<ContentItem>>,
    /// Every render, with the state of each image at that moment
    pub renders: Vec<(TabId, Vec<AssetState>)>,
    pub empty_shown: usize,
}

/// In-memory editing surface
#[derive(Clone, Default)]
pub struct FakeSurface {
    pub state: Rc<RefCell<SurfaceState>>,
}

impl FakeSurface {
    /// Replace what is on screen for `tab` with one text item
    pub fn type_text(&self, tab: &TabId, text: &str) {
        self.set_live(tab, vec![ContentItem::text(text)]);
    }

    pub fn set_live(&self, tab: &TabId, content: Vec<ContentItem>) {
        self.state.borrow_mut().live.insert(tab.clone(), content);
    }

    pub fn renders_of(&self, tab: &TabId) -> Vec<Vec<AssetState>> {
        self.state
            .borrow()
            .renders
            .iter()
            .filter(|(id, _)| id == tab)
            .map(|(_, states)| states.clone())
            .collect()
    }

    pub fn empty_shown(&self) -> usize {
        self.state.borrow().empty_shown
    }
}

impl ContentSurface for FakeSurface {
    fn serialize_visible_content(&self, tab: &TabId) -> Option<Vec<ContentItem>> {
        self.state.borrow().live.get(tab).cloned()
    }

    fn render_content(&self, tab: &Tab) {
        let states = tab
            .content
            .iter()
            .filter_map(ContentItem::asset_name)
            .map(|name| tab.asset_state(name))
            .collect();
        let mut state = self.state.borrow_mut();
        state.live.insert(tab.id.clone(), tab.content.clone());
        state.renders.push((tab.id.clone(), states));
    }

    fn notify_tab_changed(&self, _tab: &TabId) {}

    fn forget_tab(&self, tab: &TabId) {
        self.state.borrow_mut().live.remove(tab);
    }

    fn show_empty(&self) {
        self.state.borrow_mut().empty_shown += 1;
    }
}

#[derive(Default)]
pub struct PromptState {
    pub save_paths: VecDeque<Option<PathBuf>>,
    pub choices: VecDeque<UnsavedChoice>,
    pub save_prompts: Vec<String>,
    pub unsaved_prompts: Vec<Vec<String>>,
}

/// Prompts answered from a script; an empty script answers "cancel"
#[derive(Clone, Default)]
pub struct FakePrompts {
    pub state: Rc<RefCell<PromptState>>,
}

impl FakePrompts {
    pub fn answer_save_path(&self, path: Option<PathBuf>) {
        self.state.borrow_mut().save_paths.push_back(path);
    }

    pub fn answer_unsaved(&self, choice: UnsavedChoice) {
        self.state.borrow_mut().choices.push_back(choice);
    }

    pub fn unsaved_prompts(&self) -> Vec<Vec<String>> {
        self.state.borrow().unsaved_prompts.clone()
    }

    pub fn save_prompt_count(&self) -> usize {
        self.state.borrow().save_prompts.len()
    }
}

impl UserPrompts for FakePrompts {
    fn prompt_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        let mut state = self.state.borrow_mut();
        state.save_prompts.push(suggested_name.to_string());
        state.save_paths.pop_front().flatten()
    }

    fn prompt_unsaved_changes(&self, title: &str) -> UnsavedChoice {
        let mut state = self.state.borrow_mut();
        state.unsaved_prompts.push(vec![title.to_string()]);
        state.choices.pop_front().unwrap_or(UnsavedChoice::Cancel)
    }

    fn prompt_unsaved_changes_batch(&self, titles: &[String]) -> UnsavedChoice {
        let mut state = self.state.borrow_mut();
        state.unsaved_prompts.push(titles.to_vec());
        state.choices.pop_front().unwrap_or(UnsavedChoice::Cancel)
    }
}

/// A registry wired to fakes, with its files under a temp directory
pub struct Harness {
    pub registry: TabRegistry,
    pub surface: FakeSurface,
    pub prompts: FakePrompts,
    pub dir: TempDir,
}

impl Harness {
    /// Fresh registry with its own directory; call inside a tokio runtime
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (registry, surface, prompts) = registry_in(dir.path(), "assets");
        Self {
            registry,
            surface,
            prompts,
            dir,
        }
    }

    /// Another registry sharing this harness's session file, as after a restart
    pub fn restart(&self) -> (TabRegistry, FakeSurface, FakePrompts) {
        registry_in(self.dir.path(), "assets-restarted")
    }

    pub fn doc_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.dir.path().join("session.json"))
    }
}

pub fn registry_in(dir: &Path, asset_root: &str) -> (TabRegistry, FakeSurface, FakePrompts) {
    let surface = FakeSurface::default();
    let prompts = FakePrompts::default();
    let registry = TabRegistry::new(
        TempAssetStore::new(dir.join(asset_root)),
        SessionStore::new(dir.join("session.json")),
        Box::new(surface.clone()),
        Box::new(prompts.clone()),
    )
    .with_persist_delay(Duration::from_millis(50));
    (registry, surface, prompts)
}

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 42];
