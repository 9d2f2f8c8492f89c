//! Unsaved-changes protocol for closing windows and quitting

use super::host::UnsavedChoice;
use super::registry::{SaveOutcome, TabRegistry};

/// Whether a close request may go ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Proceed,
    Abort,
}

/// Decide whether the window owning `registry` may close.
///
/// The last remaining window always closes: its tabs are already in the
/// session store and come back on the next start.
pub async fn request_window_close(registry: &mut TabRegistry, open_windows: usize) -> CloseDecision {
    if open_windows <= 1 {
        tracing::info!("Closing last window; open tabs stay in the session");
        return CloseDecision::Proceed;
    }
    resolve_dirty(&mut [registry]).await
}

/// Decide whether the whole application may quit, asking once about the
/// dirty tabs of every window
pub async fn request_quit(windows: &mut [&mut TabRegistry]) -> CloseDecision {
    resolve_dirty(windows).await
}

async fn resolve_dirty(windows: &mut [&mut TabRegistry]) -> CloseDecision {
    let mut titles = Vec::new();
    for registry in windows.iter_mut() {
        registry.sync_active();
        for id in registry.dirty_tabs() {
            if let Some(tab) = registry.tab(&id) {
                titles.push(tab.display_title.clone());
            }
        }
    }
    if titles.is_empty() {
        return CloseDecision::Proceed;
    }
    let Some(first) = windows.first() else {
        return CloseDecision::Proceed;
    };

    match first.prompts().prompt_unsaved_changes_batch(&titles) {
        UnsavedChoice::Cancel => {
            tracing::debug!("Close cancelled with {} unsaved tabs", titles.len());
            CloseDecision::Abort
        }
        UnsavedChoice::Discard => {
            for registry in windows.iter_mut() {
                registry.discard_dirty().await;
            }
            CloseDecision::Proceed
        }
        UnsavedChoice::Save => {
            for registry in windows.iter_mut() {
                if !save_all(registry).await {
                    return CloseDecision::Abort;
                }
            }
            CloseDecision::Proceed
        }
    }
}

/// Save every dirty tab in turn, then reactivate the tab that was active.
///
/// Stops at the first save that is cancelled or fails.
async fn save_all(registry: &mut TabRegistry) -> bool {
    let original = registry.active_id().cloned();
    let mut all_saved = true;

    for id in registry.dirty_tabs() {
        if let Err(e) = registry.switch_to(&id).await {
            tracing::warn!("Could not activate tab {} for saving: {}", id, e);
            all_saved = false;
            break;
        }
        match registry.save(&id).await {
            Ok(SaveOutcome::Saved(_)) => {}
            Ok(SaveOutcome::Cancelled) => {
                tracing::info!("Save of tab {} cancelled; aborting close", id);
                all_saved = false;
                break;
            }
            Err(e) => {
                tracing::warn!("Save of tab {} failed; aborting close: {}", id, e);
                all_saved = false;
                break;
            }
        }
    }

    if let Some(original) = original {
        if let Err(e) = registry.switch_to(&original).await {
            tracing::warn!("Could not reactivate tab {}: {}", original, e);
        }
    }
    all_saved
}
