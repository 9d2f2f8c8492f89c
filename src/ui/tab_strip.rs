//! Tab strip above the editor

use eframe::egui;

use crate::core::registry::TabRegistry;
use crate::core::tab::TabId;

/// Something the user asked for in the tab strip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabAction {
    Activate(TabId),
    Close(TabId),
    Move { id: TabId, to: usize },
}

/// Tab strip panel
pub struct TabStrip;

impl TabStrip {
    /// Show one entry per tab, in registry order
    pub fn show(ui: &mut egui::Ui, registry: &TabRegistry) -> Option<TabAction> {
        let mut action = None;
        let count = registry.len();
        if registry.is_empty() {
            ui.weak("No open documents");
            return None;
        }

        ui.horizontal_wrapped(|ui| {
            for (index, tab) in registry.tabs().enumerate() {
                let title = if tab.modified {
                    format!("{}*", tab.display_title)
                } else {
                    tab.display_title.clone()
                };
                let is_active = registry.active_id() == Some(&tab.id);

                let hover = if tab.is_draft() {
                    format!("{} (unsaved draft)", tab.full_title)
                } else {
                    tab.full_title.clone()
                };
                let response = ui
                    .selectable_label(is_active, title)
                    .on_hover_text(hover);
                if response.clicked() {
                    action = Some(TabAction::Activate(tab.id.clone()));
                }
                if response.middle_clicked() {
                    action = Some(TabAction::Close(tab.id.clone()));
                }
                response.context_menu(|ui| {
                    if ui.add_enabled(index > 0, egui::Button::new("Move Left")).clicked() {
                        action = Some(TabAction::Move {
                            id: tab.id.clone(),
                            to: index - 1,
                        });
                        ui.close();
                    }
                    if ui
                        .add_enabled(index + 1 < count, egui::Button::new("Move Right"))
                        .clicked()
                    {
                        action = Some(TabAction::Move {
                            id: tab.id.clone(),
                            to: index + 1,
                        });
                        ui.close();
                    }
                    if ui.button("Close").clicked() {
                        action = Some(TabAction::Close(tab.id.clone()));
                        ui.close();
                    }
                });

                if ui.small_button("x").on_hover_text("Close tab").clicked() {
                    action = Some(TabAction::Close(tab.id.clone()));
                }
                ui.separator();
            }
        });

        action
    }
}
