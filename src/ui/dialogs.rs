//! Native dialogs answering the engine's questions

use std::path::PathBuf;

use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

use crate::core::archive::EXTENSION;
use crate::core::host::{UnsavedChoice, UserPrompts};

const SAVE_LABEL: &str = "Save";
const DISCARD_LABEL: &str = "Don't Save";
const CANCEL_LABEL: &str = "Cancel";

/// [`UserPrompts`] backed by rfd dialogs
pub struct NativeDialogs;

impl NativeDialogs {
    fn ask(description: String) -> UnsavedChoice {
        let result = MessageDialog::new()
            .set_level(MessageLevel::Warning)
            .set_title("Unsaved changes")
            .set_description(description)
            .set_buttons(MessageButtons::YesNoCancelCustom(
                SAVE_LABEL.to_string(),
                DISCARD_LABEL.to_string(),
                CANCEL_LABEL.to_string(),
            ))
            .show();

        match result {
            MessageDialogResult::Yes => UnsavedChoice::Save,
            MessageDialogResult::No => UnsavedChoice::Discard,
            MessageDialogResult::Custom(label) if label == SAVE_LABEL => UnsavedChoice::Save,
            MessageDialogResult::Custom(label) if label == DISCARD_LABEL => UnsavedChoice::Discard,
            _ => UnsavedChoice::Cancel,
        }
    }
}

/// Ask for a document to open
pub fn pick_document() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Txti document", &[EXTENSION])
        .pick_file()
}

/// Ask for an image to insert
pub fn pick_image() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Image", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
        .pick_file()
}

impl UserPrompts for NativeDialogs {
    fn prompt_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        FileDialog::new()
            .add_filter("Txti document", &[EXTENSION])
            .set_file_name(suggested_name)
            .save_file()
    }

    fn prompt_unsaved_changes(&self, title: &str) -> UnsavedChoice {
        Self::ask(format!(
            "Do you want to save the changes you made to \"{}\"?",
            title
        ))
    }

    fn prompt_unsaved_changes_batch(&self, titles: &[String]) -> UnsavedChoice {
        Self::ask(format!(
            "These documents have unsaved changes:\n\n{}\n\nSave them before closing?",
            titles.join("\n")
        ))
    }
}
