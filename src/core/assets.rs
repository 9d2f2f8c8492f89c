//! Per-tab scratch directories for images not yet written into an archive

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::error::AssetError;
use super::tab::TabId;

/// A freshly written asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub asset_name: String,
    pub path: PathBuf,
}

/// Scratch storage rooted at one directory, with one subdirectory per tab
#[derive(Debug, Clone)]
pub struct TempAssetStore {
    root: PathBuf,
}

impl TempAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted in the OS temp directory, unique to this process
    pub fn for_process() -> Self {
        Self::new(std::env::temp_dir().join(format!("txti-{}", std::process::id())))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by `tab`, whether or not it exists yet
    pub fn tab_dir(&self, tab: &TabId) -> PathBuf {
        self.root.join(tab.as_str())
    }

    /// Directory for assets extracted from the tab's archive
    pub fn archive_dir(&self, tab: &TabId) -> PathBuf {
        self.tab_dir(tab).join("archive")
    }

    /// Create the tab's directory if needed and return it
    pub async fn allocate(&self, tab: &TabId) -> Result<PathBuf, AssetError> {
        let dir = self.tab_dir(tab);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AssetError::io(&dir, e))?;
        Ok(dir)
    }

    /// Delete the tab's directory; unknown or already released tabs are ignored
    pub async fn release(&self, tab: &TabId) {
        let dir = self.tab_dir(tab);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!("Released asset directory {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to release {}: {}", dir.display(), e),
        }
    }

    /// Write a new asset under a generated unique name
    pub async fn write_asset(&self, tab: &TabId, bytes: &[u8]) -> Result<StoredAsset, AssetError> {
        let dir = self.allocate(tab).await?;
        let asset_name = format!("{}.{}", uuid::Uuid::new_v4(), sniff_extension(bytes));
        let path = dir.join(&asset_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AssetError::io(&path, e))?;
        Ok(StoredAsset { asset_name, path })
    }

    /// Base64 snapshot of the named assets; missing ones are left out
    pub async fn read_assets_as_base64(
        &self,
        tab: &TabId,
        asset_names: &[String],
    ) -> BTreeMap<String, String> {
        let dir = self.tab_dir(tab);
        let mut encoded = BTreeMap::new();
        for name in asset_names {
            let path = dir.join(name);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    encoded.insert(name.clone(), STANDARD.encode(bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!("{}", AssetError::Missing(name.clone()));
                }
                Err(e) => tracing::warn!("Asset {} unavailable for snapshot: {}", name, e),
            }
        }
        encoded
    }

    /// Recreate assets from a base64 snapshot, returning where each landed.
    ///
    /// Entries that fail to decode or write are logged and skipped.
    pub async fn restore_assets_from_base64(
        &self,
        tab: &TabId,
        encoded: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, PathBuf>, AssetError> {
        let dir = self.allocate(tab).await?;
        let mut restored = BTreeMap::new();
        for (name, data) in encoded {
            if !is_plain_name(name) {
                tracing::warn!("Refusing to restore asset with unsafe name {:?}", name);
                continue;
            }
            let bytes = match STANDARD.decode(data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = AssetError::Decode {
                        name: name.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                    continue;
                }
            };
            let path = dir.join(name);
            match tokio::fs::write(&path, bytes).await {
                Ok(()) => {
                    restored.insert(name.clone(), path);
                }
                Err(e) => tracing::warn!("{}", AssetError::io(&path, e)),
            }
        }
        Ok(restored)
    }

    /// Remove every tab directory and the root itself
    pub async fn sweep(&self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::debug!("Removed asset root {}", self.root.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.root.display(), e),
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// File extension guessed from the leading bytes of an image
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        [b'B', b'M', ..] => "bmp",
        _ => "bin",
    }
}
