//! Txti - tabbed rich-text editor
//!
//! Documents are zip archives holding structured content and embedded images.
//! Open tabs, including unsaved drafts, survive restarts through the session store.

mod app;
mod core;
mod ui;

use app::{Stores, TxtiApp};
use eframe::egui;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Txti...");

    let stores = Stores::default_locations()?;
    let bounds = stores.settings.load().window_bounds();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut viewport = egui::ViewportBuilder::default()
        .with_inner_size([bounds.width, bounds.height])
        .with_min_inner_size([480.0, 320.0])
        .with_title("Txti");
    if let (Some(x), Some(y)) = (bounds.x, bounds.y) {
        viewport = viewport.with_position([x, y]);
    }

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Txti",
        native_options,
        Box::new(move |cc| Ok(Box::new(TxtiApp::new(cc, runtime, stores)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run the editor window: {}", e))
}
