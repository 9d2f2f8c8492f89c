//! Document editor panel

use eframe::egui;

use super::surface::{Block, EguiSurface};
use crate::core::tab::{AssetState, Tab};

/// Document editor panel
pub struct EditorPanel;

impl EditorPanel {
    /// Show the active tab's blocks; returns whether the user changed anything
    pub fn show(ui: &mut egui::Ui, surface: &EguiSurface, tab: Option<&Tab>, word_wrap: bool) -> bool {
        let Some(tab) = tab else {
            Self::show_welcome(ui);
            return false;
        };

        if !tab.full_title.is_empty() {
            ui.heading(&tab.full_title);
            ui.separator();
        }

        let mut changed = false;
        let mut state = surface.state();
        let Some(blocks) = state.blocks.get_mut(&tab.id) else {
            return false;
        };

        egui::ScrollArea::vertical()
            .id_salt("editor_scroll")
            .show(ui, |ui| {
                for (index, block) in blocks.iter_mut().enumerate() {
                    ui.push_id(index, |ui| match block {
                        Block::Text(text) => {
                            let mut edit = egui::TextEdit::multiline(text)
                                .desired_width(f32::INFINITY)
                                .desired_rows(3);
                            if !word_wrap {
                                edit = edit.code_editor();
                            }
                            if ui.add(edit).changed() {
                                changed = true;
                            }
                        }
                        Block::Image {
                            asset_name,
                            width_px,
                            state,
                        } => {
                            changed |= Self::show_image(ui, asset_name, width_px, state);
                        }
                    });
                }
            });

        changed
    }

    fn show_image(
        ui: &mut egui::Ui,
        asset_name: &str,
        width_px: &mut Option<u32>,
        state: &AssetState,
    ) -> bool {
        let width = width_px.unwrap_or(400) as f32;
        match state {
            AssetState::Ready(path) => {
                let uri = format!("file://{}", path.display());
                ui.add(egui::Image::new(uri).max_width(width));
            }
            AssetState::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {}", asset_name));
                });
            }
            AssetState::Unavailable => {
                ui.colored_label(
                    egui::Color32::from_rgb(224, 108, 117),
                    format!("Image unavailable: {}", asset_name),
                );
            }
        }

        let mut value = width_px.unwrap_or(400);
        let response = ui.add(
            egui::DragValue::new(&mut value)
                .range(16..=4096)
                .suffix(" px"),
        );
        if response.changed() {
            *width_px = Some(value);
            return true;
        }
        false
    }

    /// Show welcome screen when no tab is open
    fn show_welcome(ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(100.0);

            ui.heading("No open documents");
            ui.add_space(20.0);

            ui.label("Create a new document or open a .txti file to get started.");
            ui.add_space(10.0);

            ui.label("Keyboard shortcuts:");
            ui.label("  Ctrl+N - New tab");
            ui.label("  Ctrl+O - Open");
            ui.label("  Ctrl+S - Save");
            ui.label("  Ctrl+W - Close tab");
        });
    }
}
