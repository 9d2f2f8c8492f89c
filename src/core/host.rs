//! Interfaces the session engine needs from the surrounding UI

use std::path::PathBuf;

use super::content::ContentItem;
use super::tab::{Tab, TabId};

/// Answer to an unsaved-changes prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsavedChoice {
    Save,
    Discard,
    Cancel,
}

/// The visible editing surface
pub trait ContentSurface {
    /// Current on-screen content of `tab`, or `None` if the surface holds
    /// nothing for it
    fn serialize_visible_content(&self, tab: &TabId) -> Option<Vec<ContentItem>>;

    /// Show `tab`'s content. Images resolve through [`Tab::asset_state`].
    fn render_content(&self, tab: &Tab);

    /// Title, modified flag or order of `tab` changed
    fn notify_tab_changed(&self, tab: &TabId);

    /// `tab` is gone; drop anything held for it
    fn forget_tab(&self, _tab: &TabId) {}

    /// The last tab closed
    fn show_empty(&self) {}
}

/// Blocking questions put to the user
pub trait UserPrompts {
    /// Ask where to save; `None` means the user cancelled
    fn prompt_save_path(&self, suggested_name: &str) -> Option<PathBuf>;

    fn prompt_unsaved_changes(&self, title: &str) -> UnsavedChoice;

    /// One combined question for several dirty documents
    fn prompt_unsaved_changes_batch(&self, titles: &[String]) -> UnsavedChoice;
}
