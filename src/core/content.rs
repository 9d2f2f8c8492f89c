//! Document body model and title derivation

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder title for documents without a name or any text
pub const UNTITLED: &str = "Untitled";

/// Maximum title length in the tab strip
pub const TAB_TITLE_MAX_CHARS: usize = 24;

/// Maximum title length in the header readout
pub const HEADER_TITLE_MAX_CHARS: usize = 60;

const ELLIPSIS: &str = "...";

/// One item of a document body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// A run of text, possibly spanning several lines
    Text { value: String },
    /// An embedded image referencing a named asset
    #[serde(alias = "img")]
    Image {
        #[serde(rename = "assetName")]
        asset_name: String,
        #[serde(rename = "widthPx", default, skip_serializing_if = "Option::is_none")]
        width_px: Option<u32>,
    },
}

impl ContentItem {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn image(asset_name: impl Into<String>, width_px: Option<u32>) -> Self {
        Self::Image {
            asset_name: asset_name.into(),
            width_px,
        }
    }

    /// Asset referenced by this item, if it is an image
    #[cfg(test)]
    pub fn asset_name(&self) -> Option<&str> {
        match self {
            Self::Image { asset_name, .. } => Some(asset_name),
            Self::Text { .. } => None,
        }
    }
}

/// JSON payload stored in the structured-content entry of an archive.
///
/// Unknown top-level keys are kept in `metadata` and written back on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub content: Vec<ContentItem>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// First non-blank line of the document's text, trimmed
pub fn first_text_line(content: &[ContentItem]) -> Option<&str> {
    content
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text { value } => Some(value.as_str()),
            ContentItem::Image { .. } => None,
        })
        .flat_map(str::lines)
        .map(str::trim)
        .find(|line| !line.is_empty())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(ELLIPSIS.len()).max(1);
    let kept: String = text.chars().take(budget).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Title shown in the tab strip.
///
/// File names keep their extension and lose characters from the stem;
/// draft titles are cut from the end.
pub fn tab_strip_title(path: Option<&Path>, content: &[ContentItem]) -> String {
    match path {
        Some(path) => {
            let name = file_name(path);
            if name.chars().count() <= TAB_TITLE_MAX_CHARS {
                return name;
            }
            match (path.file_stem(), path.extension()) {
                (Some(stem), Some(ext)) => {
                    let stem = stem.to_string_lossy();
                    let ext = ext.to_string_lossy();
                    let budget = TAB_TITLE_MAX_CHARS
                        .saturating_sub(ext.chars().count() + 1 + ELLIPSIS.len())
                        .max(1);
                    let kept: String = stem.chars().take(budget).collect();
                    format!("{}{}.{}", kept, ELLIPSIS, ext)
                }
                _ => truncate_chars(&name, TAB_TITLE_MAX_CHARS),
            }
        }
        None => first_text_line(content)
            .map(|line| truncate_chars(line, TAB_TITLE_MAX_CHARS))
            .unwrap_or_else(|| UNTITLED.to_string()),
    }
}

/// Title shown in the header readout: the whole file name, or a longer
/// cut of the first text line for drafts
pub fn header_title(path: Option<&Path>, content: &[ContentItem]) -> String {
    match path {
        Some(path) => file_name(path),
        None => first_text_line(content)
            .map(|line| truncate_chars(line, HEADER_TITLE_MAX_CHARS))
            .unwrap_or_else(|| UNTITLED.to_string()),
    }
}
