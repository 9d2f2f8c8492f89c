//! Small filesystem helpers shared by the persistence modules

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling path used while a file is being replaced
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Move a fully written temp file over `final_path`.
///
/// Some platforms refuse to rename over an existing file. The existing file
/// is then moved aside and only deleted once the new one is in place; if the
/// retry fails it is moved back.
pub fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(tmp_path, final_path) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if !tmp_path.exists() || !final_path.exists() {
        let _ = fs::remove_file(tmp_path);
        return Err(rename_err);
    }

    let backup = temp_sibling(final_path);
    fs::rename(final_path, &backup)?;
    match fs::rename(tmp_path, final_path) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&backup) {
                tracing::warn!("Failed to remove backup {}: {}", backup.display(), e);
            }
            Ok(())
        }
        Err(e) => {
            if let Err(restore_err) = fs::rename(&backup, final_path) {
                tracing::warn!(
                    "Failed to restore {} from {}: {}",
                    final_path.display(),
                    backup.display(),
                    restore_err
                );
            }
            let _ = fs::remove_file(tmp_path);
            Err(e)
        }
    }
}

/// Write `bytes` to `path` without ever leaving a half-written file behind
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_sibling(path);
    if let Err(e) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    replace_file(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txti");
        fs::write(&path, "previous").unwrap();

        let missing = dir.path().join(".doc.txti.gone.tmp");
        assert!(replace_file(&missing, &path).is_err());

        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_atomic_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }
}
