//! Main application state and UI coordination

use eframe::egui;
use serde_json::Map;
use tokio::runtime::Runtime;

use crate::core::assets::TempAssetStore;
use crate::core::close::{self, CloseDecision};
use crate::core::error::TabError;
use crate::core::registry::{CloseOutcome, SaveOutcome, TabRegistry};
use crate::core::session::SessionStore;
use crate::core::settings::{Settings, SettingsStore, WindowBounds};
use crate::core::tab::{AssetState, TabId};
use crate::ui::dialogs::{self, NativeDialogs};
use crate::ui::editor::EditorPanel;
use crate::ui::surface::EguiSurface;
use crate::ui::tab_strip::{TabAction, TabStrip};

/// Files and directories the application persists to
pub struct Stores {
    pub settings: SettingsStore,
    pub sessions: SessionStore,
    pub assets: TempAssetStore,
}

impl Stores {
    /// Platform locations for the current user
    pub fn default_locations() -> anyhow::Result<Self> {
        let stores = Self {
            settings: SettingsStore::default_location()?,
            sessions: SessionStore::default_location()?,
            assets: TempAssetStore::for_process(),
        };
        tracing::info!("Settings file: {}", stores.settings.path().display());
        tracing::info!("Session file: {}", stores.sessions.path().display());
        tracing::info!("Scratch assets: {}", stores.assets.root().display());
        Ok(stores)
    }
}

/// Main application state
pub struct TxtiApp {
    /// Runtime the session engine's I/O runs on
    runtime: Runtime,
    /// Open tabs of this window
    registry: TabRegistry,
    /// Editable blocks shared with the registry
    surface: EguiSurface,
    settings_store: SettingsStore,
    settings: Settings,
    /// Last error shown to the user
    status: Option<String>,
    /// Window title last sent to the viewport
    window_title: String,
    shut_down: bool,
}

impl TxtiApp {
    /// Create the application and restore the previous session
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime, stores: Stores) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);

        let surface = EguiSurface::default();
        let registry = {
            let _guard = runtime.enter();
            TabRegistry::new(
                stores.assets,
                stores.sessions,
                Box::new(surface.clone()),
                Box::new(NativeDialogs),
            )
        };
        let settings = stores.settings.load();

        let mut app = Self {
            runtime,
            registry,
            surface,
            settings_store: stores.settings,
            settings,
            status: None,
            window_title: String::new(),
            shut_down: false,
        };

        match app.runtime.block_on(app.registry.restore_session()) {
            Ok(report) => {
                tracing::info!("Restored {} tabs ({:?})", report.restored, report.source);
                if !report.failed.is_empty() {
                    let names: Vec<String> = report
                        .failed
                        .iter()
                        .map(|(path, _)| path.display().to_string())
                        .collect();
                    app.status = Some(format!("Could not reopen: {}", names.join(", ")));
                }
            }
            Err(e) => app.report::<()>(Err(e)),
        }
        app
    }

    fn report<T>(&mut self, result: Result<T, TabError>) {
        if let Err(e) = result {
            tracing::error!("{}", e);
            self.status = Some(match &e {
                TabError::Archive(archive) if archive.is_format() => {
                    format!("Cannot open: {}", archive)
                }
                _ => e.to_string(),
            });
        }
    }

    fn new_tab(&mut self) {
        let result = self.runtime.block_on(self.registry.create_tab(None));
        self.report(result);
    }

    fn open_document(&mut self) {
        if let Some(path) = dialogs::pick_document() {
            let result = self.runtime.block_on(self.registry.open(&path));
            self.report(result);
        }
    }

    fn save_active(&mut self, choose_path: bool) {
        let Some(id) = self.registry.active_id().cloned() else {
            return;
        };
        let registry = &mut self.registry;
        let result = self.runtime.block_on(async move {
            if choose_path {
                registry.save_as(&id).await
            } else {
                registry.save(&id).await
            }
        });
        match result {
            Ok(SaveOutcome::Saved(path)) => {
                self.status = None;
                tracing::debug!("Saved {}", path.display());
            }
            Ok(SaveOutcome::Cancelled) => {}
            Err(e) => self.report::<()>(Err(e)),
        }
    }

    fn close_tab(&mut self, id: &TabId) {
        let result = self.runtime.block_on(self.registry.close(id));
        if let Ok(CloseOutcome::Cancelled) = result {
            tracing::debug!("Close of {} cancelled", id);
        }
        self.report(result);
    }

    fn insert_image(&mut self) {
        let Some(id) = self.registry.active_id().cloned() else {
            return;
        };
        let Some(path) = dialogs::pick_image() else {
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.status = Some(format!("Failed to read {}: {}", path.display(), e));
                return;
            }
        };

        let result = self.runtime.block_on(self.registry.paste_image(&id, &bytes));
        let asset_name = match result {
            Ok(name) => name,
            Err(e) => return self.report::<()>(Err(e)),
        };
        let state = self
            .registry
            .tab(&id)
            .map(|tab| tab.asset_state(&asset_name))
            .unwrap_or(AssetState::Unavailable);
        self.surface
            .push_image(&id, asset_name, self.settings.default_image_width(), state);
        let result = self.registry.edit(&id);
        self.report(result);
    }

    fn apply(&mut self, action: TabAction) {
        match action {
            TabAction::Activate(id) => {
                let result = self.runtime.block_on(self.registry.switch_to(&id));
                self.report(result);
            }
            TabAction::Close(id) => self.close_tab(&id),
            TabAction::Move { id, to } => {
                let result = self.registry.move_tab(&id, to);
                self.report(result);
            }
        }
    }

    fn cycle(&mut self, forward: bool) {
        let result = self.runtime.block_on(self.registry.cycle(forward));
        self.report(result);
    }

    fn remember_window_bounds(&self, ctx: &egui::Context) {
        let Some(rect) = ctx.input(|i| i.viewport().outer_rect) else {
            return;
        };
        let bounds = WindowBounds {
            x: Some(rect.min.x),
            y: Some(rect.min.y),
            width: rect.width(),
            height: rect.height(),
        };
        if let Ok(value) = serde_json::to_value(bounds) {
            let mut partial = Map::new();
            partial.insert("windowBounds".to_string(), value);
            self.settings_store.save(partial);
        }
    }

    fn finish(&mut self, ctx: &egui::Context) {
        self.remember_window_bounds(ctx);
        self.runtime.block_on(self.registry.shutdown());
        self.shut_down = true;
    }

    /// Run the unsaved-changes protocol for this window
    fn handle_close_request(&mut self, ctx: &egui::Context) {
        let open_windows = ctx.input(|i| i.raw.viewports.len()).max(1);
        let decision = self
            .runtime
            .block_on(close::request_window_close(&mut self.registry, open_windows));
        match decision {
            CloseDecision::Proceed => self.finish(ctx),
            CloseDecision::Abort => ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose),
        }
    }

    /// Quit the application, asking once about every unsaved tab
    fn quit(&mut self, ctx: &egui::Context) {
        let decision = self
            .runtime
            .block_on(close::request_quit(&mut [&mut self.registry]));
        if decision == CloseDecision::Proceed {
            self.finish(ctx);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn settings_summary(&self) -> String {
        let settings = &self.settings;
        let indent = if settings.indent_char() == "tab" {
            format!("Tab width: {}", settings.tab_size())
        } else {
            format!("Spaces: {}", settings.indent_size())
        };
        let auto_indent = if settings.auto_indent() { "on" } else { "off" };
        format!(
            "{}  |  {}  |  Auto-indent {}",
            settings.line_ending().to_uppercase(),
            indent,
            auto_indent
        )
    }

    fn update_window_title(&mut self, ctx: &egui::Context) {
        let title = match self.registry.active_tab() {
            Some(tab) if tab.modified => format!("{}* - Txti", tab.full_title),
            Some(tab) => format!("{} - Txti", tab.full_title),
            None => "Txti".to_string(),
        };
        if title != self.window_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.window_title = title;
        }
    }

    /// Render the top menu bar
    fn render_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("New Tab").clicked() {
                        self.new_tab();
                        ui.close();
                    }
                    if ui.button("Open...").clicked() {
                        self.open_document();
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Save").clicked() {
                        self.save_active(false);
                        ui.close();
                    }
                    if ui.button("Save As...").clicked() {
                        self.save_active(true);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Close Tab").clicked() {
                        if let Some(id) = self.registry.active_id().cloned() {
                            self.close_tab(&id);
                        }
                        ui.close();
                    }
                    if ui.button("Exit").clicked() {
                        ui.close();
                        self.quit(ctx);
                    }
                });

                ui.menu_button("Insert", |ui| {
                    if ui.button("Image...").clicked() {
                        self.insert_image();
                        ui.close();
                    }
                });

                ui.menu_button("View", |ui| {
                    let mut word_wrap = self.settings.word_wrap();
                    if ui.checkbox(&mut word_wrap, "Word Wrap").changed() {
                        self.settings.set("wordWrap", serde_json::Value::Bool(word_wrap));
                        let mut partial = Map::new();
                        partial.insert("wordWrap".to_string(), serde_json::Value::Bool(word_wrap));
                        self.settings_store.save(partial);
                    }
                });
            });
        });
    }
}

impl eframe::App for TxtiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.shut_down {
            return;
        }
        if ctx.input(|i| i.viewport().close_requested()) {
            self.handle_close_request(ctx);
            if self.shut_down {
                return;
            }
        }

        // Handle keyboard shortcuts
        let (new, open, save, close, next, previous, quit) = ctx.input(|i| {
            let ctrl = i.modifiers.ctrl || i.modifiers.mac_cmd;
            (
                ctrl && i.key_pressed(egui::Key::N),
                ctrl && i.key_pressed(egui::Key::O),
                ctrl && i.key_pressed(egui::Key::S),
                ctrl && i.key_pressed(egui::Key::W),
                ctrl && i.key_pressed(egui::Key::PageDown),
                ctrl && i.key_pressed(egui::Key::PageUp),
                ctrl && i.key_pressed(egui::Key::Q),
            )
        });
        if quit {
            self.quit(ctx);
            return;
        }
        if new {
            self.new_tab();
        }
        if open {
            self.open_document();
        }
        if save {
            self.save_active(false);
        }
        if close {
            if let Some(id) = self.registry.active_id().cloned() {
                self.close_tab(&id);
            }
        }
        if next || previous {
            self.cycle(next);
        }

        self.render_menu_bar(ctx);
        if self.shut_down {
            return;
        }

        let mut action = None;
        egui::TopBottomPanel::top("tab_strip").show(ctx, |ui| {
            action = TabStrip::show(ui, &self.registry);
        });
        if let Some(action) = action {
            self.apply(action);
        }

        let summary = self.settings_summary();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(status) = self.status.clone() {
                    ui.colored_label(egui::Color32::from_rgb(224, 108, 117), status);
                    if ui.small_button("Dismiss").clicked() {
                        self.status = None;
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(summary);
                });
            });
        });

        let word_wrap = self.settings.word_wrap();
        let mut edited = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            edited = EditorPanel::show(ui, &self.surface, self.registry.active_tab(), word_wrap);
        });
        if edited {
            if let Some(id) = self.registry.active_id().cloned() {
                let result = self.registry.edit(&id);
                self.report(result);
            }
        }

        self.surface.state().changed.clear();
        self.update_window_title(ctx);
    }
}
