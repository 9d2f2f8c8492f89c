//! Reading and writing `.txti` document archives
//!
//! A document is a zip file holding `content.json` (the [`DocumentPayload`])
//! and one entry per image under `assets/`. Archives are always written whole
//! to a temp sibling and renamed into place.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::task::JoinSet;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::content::{ContentItem, DocumentPayload};
use super::error::ArchiveError;
use super::fs_util;

/// Name of the structured-content entry
pub const CONTENT_ENTRY: &str = "content.json";

/// Prefix of asset entries
pub const ASSET_PREFIX: &str = "assets/";

/// Document file extension
pub const EXTENSION: &str = "txti";

/// Structured content of an archive, without asset bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveContents {
    pub content: Vec<ContentItem>,
    pub metadata: Map<String, Value>,
    pub asset_names: Vec<String>,
}

/// Outcome of a successful archive write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    /// Assets left out because their source could not be read
    pub skipped: Vec<String>,
}

async fn blocking<T, F>(f: F) -> Result<T, ArchiveError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ArchiveError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

fn read_error(path: &Path, err: ZipError) -> ArchiveError {
    match err {
        ZipError::Io(e) => ArchiveError::io(path, e),
        other => ArchiveError::format(path, other),
    }
}

fn write_error(path: &Path, err: ZipError) -> ArchiveError {
    match err {
        ZipError::Io(e) => ArchiveError::io(path, e),
        other => ArchiveError::io(path, io::Error::other(other.to_string())),
    }
}

/// Asset name for an entry, if it is a plain file directly under the asset prefix
fn entry_asset_name(entry_name: &str) -> Option<&str> {
    let name = entry_name.strip_prefix(ASSET_PREFIX)?;
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    safe.then_some(name)
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    ZipArchive::new(file).map_err(|e| read_error(path, e))
}

fn read_contents_blocking(path: &Path) -> Result<ArchiveContents, ArchiveError> {
    let mut archive = open_zip(path)?;

    let payload: DocumentPayload = {
        let mut entry = archive.by_name(CONTENT_ENTRY).map_err(|e| match e {
            ZipError::FileNotFound => {
                ArchiveError::format(path, format!("missing {}", CONTENT_ENTRY))
            }
            other => read_error(path, other),
        })?;
        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| ArchiveError::format(path, e))?;
        serde_json::from_str(&raw).map_err(|e| ArchiveError::format(path, e))?
    };

    let asset_names = archive
        .file_names()
        .filter_map(entry_asset_name)
        .map(String::from)
        .collect();

    Ok(ArchiveContents {
        content: payload.content,
        metadata: payload.metadata,
        asset_names,
    })
}

/// Read the content list and asset names without extracting any bytes
pub async fn read_structured_content(path: &Path) -> Result<ArchiveContents, ArchiveError> {
    let path = path.to_path_buf();
    blocking(move || read_contents_blocking(&path)).await
}

fn read_asset_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut archive = open_zip(path)?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Unreadable entry #{} in {}: {}", index, path.display(), e);
                continue;
            }
        };
        let raw_name = entry.name().to_string();
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry_asset_name(&raw_name).map(String::from) else {
            if raw_name.starts_with(ASSET_PREFIX) {
                tracing::warn!("Skipping unsafe asset entry {:?} in {}", raw_name, path.display());
            }
            continue;
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut bytes) {
            tracing::warn!("Failed to read asset {} from {}: {}", name, path.display(), e);
            continue;
        }
        entries.push((name, bytes));
    }

    Ok(entries)
}

/// Extract every asset into `dest_dir`.
///
/// Only a failure to open the archive (or create `dest_dir`) fails the call;
/// individual assets that cannot be read or written are logged and left out.
pub async fn extract_assets(
    path: &Path,
    dest_dir: &Path,
) -> Result<BTreeMap<String, PathBuf>, ArchiveError> {
    let source = path.to_path_buf();
    let entries = blocking(move || read_asset_entries(&source)).await?;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| ArchiveError::io(dest_dir, e))?;

    let mut writes = JoinSet::new();
    for (name, bytes) in entries {
        let target = dest_dir.join(&name);
        writes.spawn(async move {
            let result = tokio::fs::write(&target, bytes).await;
            (name, target, result)
        });
    }

    let mut extracted = BTreeMap::new();
    while let Some(joined) = writes.join_next().await {
        match joined {
            Ok((name, target, Ok(()))) => {
                extracted.insert(name, target);
            }
            Ok((name, target, Err(e))) => {
                tracing::warn!("Failed to extract asset {} to {}: {}", name, target.display(), e);
            }
            Err(e) => tracing::warn!("Asset extraction task failed: {}", e),
        }
    }

    tracing::debug!("Extracted {} assets from {}", extracted.len(), path.display());
    Ok(extracted)
}

fn write_zip_entries(
    tmp_path: &Path,
    json: &[u8],
    files: &[(String, Vec<u8>)],
) -> Result<(), ArchiveError> {
    let file = File::create(tmp_path).map_err(|e| ArchiveError::io(tmp_path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(CONTENT_ENTRY, options)
        .map_err(|e| write_error(tmp_path, e))?;
    zip.write_all(json).map_err(|e| ArchiveError::io(tmp_path, e))?;

    // Images are already compressed
    let stored = options.compression_method(CompressionMethod::Stored);
    for (name, bytes) in files {
        zip.start_file(format!("{}{}", ASSET_PREFIX, name), stored)
            .map_err(|e| write_error(tmp_path, e))?;
        zip.write_all(bytes).map_err(|e| ArchiveError::io(tmp_path, e))?;
    }

    let file = zip.finish().map_err(|e| write_error(tmp_path, e))?;
    file.sync_all().map_err(|e| ArchiveError::io(tmp_path, e))
}

fn write_zip(output: &Path, json: &[u8], files: &[(String, Vec<u8>)]) -> Result<(), ArchiveError> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
    }

    let tmp_path = fs_util::temp_sibling(output);
    if let Err(e) = write_zip_entries(&tmp_path, json, files) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs_util::replace_file(&tmp_path, output).map_err(|e| ArchiveError::io(output, e))
}

/// Write a fresh archive at `output`.
///
/// Assets whose source file cannot be read are skipped with a warning so a
/// missing image never makes a document unsavable.
pub async fn write_archive(
    content: &[ContentItem],
    metadata: &Map<String, Value>,
    assets: &BTreeMap<String, PathBuf>,
    output: &Path,
) -> Result<WriteReport, ArchiveError> {
    let payload = DocumentPayload {
        content: content.to_vec(),
        metadata: metadata.clone(),
    };
    let json = serde_json::to_vec_pretty(&payload).map_err(|e| ArchiveError::format(output, e))?;

    let mut files = Vec::with_capacity(assets.len());
    let mut skipped = Vec::new();
    for (name, source) in assets {
        match tokio::fs::read(source).await {
            Ok(bytes) => files.push((name.clone(), bytes)),
            Err(e) => {
                tracing::warn!("Skipping asset {} ({}): {}", name, source.display(), e);
                skipped.push(name.clone());
            }
        }
    }

    let written = files.len();
    let target = output.to_path_buf();
    blocking(move || write_zip(&target, &json, &files)).await?;

    tracing::info!("Saved document: {} ({} assets)", output.display(), written);
    Ok(WriteReport { written, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_content() -> Vec<ContentItem> {
        vec![
            ContentItem::text("Hello\nworld"),
            ContentItem::image("cat.png", Some(240)),
            ContentItem::text("after"),
            ContentItem::image("cat.png", None),
        ]
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cat.png");
        fs::write(&source, [0x89, b'P', b'N', b'G', 1, 2, 3]).unwrap();
        let assets = BTreeMap::from([("cat.png".to_string(), source)]);
        let output = dir.path().join("doc.txti");

        let mut metadata = Map::new();
        metadata.insert("version".to_string(), Value::from(2));

        let report = write_archive(&sample_content(), &metadata, &assets, &output)
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert!(report.skipped.is_empty());

        let contents = read_structured_content(&output).await.unwrap();
        assert_eq!(contents.content, sample_content());
        assert_eq!(contents.asset_names, vec!["cat.png".to_string()]);
        assert_eq!(contents.metadata.get("version"), Some(&Value::from(2)));

        let extracted = extract_assets(&output, &dir.path().join("out")).await.unwrap();
        let copy = fs::read(&extracted["cat.png"]).unwrap();
        assert_eq!(copy, vec![0x89, b'P', b'N', b'G', 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_asset_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        fs::write(&good, b"good").unwrap();
        let assets = BTreeMap::from([
            ("good.png".to_string(), good),
            ("gone.png".to_string(), dir.path().join("gone.png")),
        ]);
        let output = dir.path().join("doc.txti");

        let report = write_archive(&[], &Map::new(), &assets, &output).await.unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, vec!["gone.png".to_string()]);

        let contents = read_structured_content(&output).await.unwrap();
        assert_eq!(contents.asset_names, vec!["good.png".to_string()]);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_previous_archive() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("doc.txti");

        write_archive(&[ContentItem::text("one")], &Map::new(), &BTreeMap::new(), &output)
            .await
            .unwrap();
        write_archive(&[ContentItem::text("two")], &Map::new(), &BTreeMap::new(), &output)
            .await
            .unwrap();

        let contents = read_structured_content(&output).await.unwrap();
        assert_eq!(contents.content, vec![ContentItem::text("two")]);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["doc.txti".to_string()]);
    }

    #[tokio::test]
    async fn test_not_a_zip_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.txti");
        fs::write(&path, "just some text").unwrap();

        let err = read_structured_content(&path).await.unwrap_err();
        assert!(err.is_format(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_missing_content_entry_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.txti");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hi").unwrap();
        zip.finish().unwrap();

        let err = read_structured_content(&path).await.unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains(CONTENT_ENTRY));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_structured_content(&dir.path().join("nope.txti"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }

    #[tokio::test]
    async fn test_extract_skips_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evil.txti");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file(CONTENT_ENTRY, options).unwrap();
        zip.write_all(br#"{"content":[]}"#).unwrap();
        zip.start_file("assets/../escape.png", options).unwrap();
        zip.write_all(b"x").unwrap();
        zip.start_file("assets/ok.png", options).unwrap();
        zip.write_all(b"y").unwrap();
        zip.finish().unwrap();

        let extracted = extract_assets(&path, &dir.path().join("out")).await.unwrap();
        assert_eq!(extracted.keys().collect::<Vec<_>>(), vec!["ok.png"]);
        assert!(!dir.path().join("escape.png").exists());
    }

    #[tokio::test]
    async fn test_extract_continues_past_failed_asset() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.png");
        let second = dir.path().join("second.png");
        fs::write(&first, b"one").unwrap();
        fs::write(&second, b"two").unwrap();
        let output = dir.path().join("doc.txti");
        let assets = BTreeMap::from([
            ("blocked.png".to_string(), first.clone()),
            ("first.png".to_string(), first),
            ("second.png".to_string(), second),
        ]);
        write_archive(&[], &Map::new(), &assets, &output).await.unwrap();

        let dest = dir.path().join("out");
        fs::create_dir_all(dest.join("blocked.png")).unwrap();

        let extracted = extract_assets(&output, &dest).await.unwrap();
        assert_eq!(
            extracted.keys().collect::<Vec<_>>(),
            vec!["first.png", "second.png"]
        );
        assert_eq!(fs::read(&extracted["second.png"]).unwrap(), b"two");
    }

    #[test]
    fn test_entry_asset_name() {
        assert_eq!(entry_asset_name("assets/a.png"), Some("a.png"));
        assert_eq!(entry_asset_name("assets/"), None);
        assert_eq!(entry_asset_name("assets/sub/a.png"), None);
        assert_eq!(entry_asset_name("content.json"), None);
    }
}
