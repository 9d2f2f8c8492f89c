//! Editable on-screen form of each tab's content

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::core::content::ContentItem;
use crate::core::host::ContentSurface;
use crate::core::tab::{AssetState, Tab, TabId};

/// One editable block of a document
#[derive(Debug, Clone)]
pub enum Block {
    Text(String),
    Image {
        asset_name: String,
        width_px: Option<u32>,
        state: AssetState,
    },
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub blocks: HashMap<TabId, Vec<Block>>,
    /// Tabs whose strip entry needs redrawing
    pub changed: HashSet<TabId>,
}

/// Surface shared between the registry and the egui panels
#[derive(Debug, Clone, Default)]
pub struct EguiSurface {
    state: Rc<RefCell<SurfaceState>>,
}

impl EguiSurface {
    pub fn state(&self) -> std::cell::RefMut<'_, SurfaceState> {
        self.state.borrow_mut()
    }

    /// Append an image block after the tab's content
    pub fn push_image(&self, tab: &TabId, asset_name: String, width_px: u32, state: AssetState) {
        let mut surface = self.state.borrow_mut();
        let blocks = surface.blocks.entry(tab.clone()).or_default();
        blocks.push(Block::Image {
            asset_name,
            width_px: Some(width_px),
            state,
        });
        blocks.push(Block::Text(String::new()));
    }
}

fn to_blocks(tab: &Tab) -> Vec<Block> {
    let mut blocks: Vec<Block> = tab
        .content
        .iter()
        .map(|item| match item {
            ContentItem::Text { value } => Block::Text(value.clone()),
            ContentItem::Image {
                asset_name,
                width_px,
            } => Block::Image {
                asset_name: asset_name.clone(),
                width_px: *width_px,
                state: tab.asset_state(asset_name),
            },
        })
        .collect();
    if !matches!(blocks.last(), Some(Block::Text(_))) {
        blocks.push(Block::Text(String::new()));
    }
    blocks
}

fn to_items(blocks: &[Block]) -> Vec<ContentItem> {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text(text) if text.is_empty() => None,
            Block::Text(text) => Some(ContentItem::text(text.clone())),
            Block::Image {
                asset_name,
                width_px,
                ..
            } => Some(ContentItem::image(asset_name.clone(), *width_px)),
        })
        .collect()
}

impl ContentSurface for EguiSurface {
    fn serialize_visible_content(&self, tab: &TabId) -> Option<Vec<ContentItem>> {
        self.state.borrow().blocks.get(tab).map(|blocks| to_items(blocks))
    }

    fn render_content(&self, tab: &Tab) {
        let mut state = self.state.borrow_mut();
        state.blocks.insert(tab.id.clone(), to_blocks(tab));
    }

    fn notify_tab_changed(&self, tab: &TabId) {
        self.state.borrow_mut().changed.insert(tab.clone());
    }

    fn forget_tab(&self, tab: &TabId) {
        let mut state = self.state.borrow_mut();
        state.blocks.remove(tab);
        state.changed.remove(tab);
    }

    fn show_empty(&self) {
        let mut state = self.state.borrow_mut();
        state.blocks.clear();
        state.changed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_roundtrip_content() {
        let content = vec![
            ContentItem::text("intro"),
            ContentItem::image("a.png", Some(120)),
        ];
        let tab = Tab::draft(TabId::from("t"), content.clone());
        let surface = EguiSurface::default();

        surface.render_content(&tab);
        assert_eq!(surface.serialize_visible_content(&tab.id), Some(content));
    }

    #[test]
    fn test_forget_drops_blocks() {
        let tab = Tab::draft(TabId::from("t"), vec![ContentItem::text("bye")]);
        let surface = EguiSurface::default();
        surface.render_content(&tab);
        surface.notify_tab_changed(&tab.id);

        surface.forget_tab(&tab.id);
        assert!(surface.serialize_visible_content(&tab.id).is_none());
        assert!(surface.state().changed.is_empty());
    }

    #[test]
    fn test_unknown_tab_serializes_to_none() {
        let surface = EguiSurface::default();
        assert!(surface.serialize_visible_content(&TabId::from("x")).is_none());
    }
}
