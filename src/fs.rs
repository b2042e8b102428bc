//! File-system collaborator
//!
//! The transcoder only needs a handful of path operations (existence checks
//! and cleanup of partial outputs). They go through [`FileSystem`] so the
//! pipeline never depends on how paths are actually stored. Every operation
//! reports failure as `false`/`None`/empty and logs the underlying error.

use std::fmt::Debug;
use std::io::Write;
use std::path::Path;

/// Path operations consumed by the transcoder.
pub trait FileSystem: Send + Sync + Debug {
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Create `path` and all missing parents.
    fn create_directory(&self, path: &Path) -> bool;

    /// Atomically create an empty file at `path`; `false` if anything is
    /// already there or the file cannot be created.
    fn create_new(&self, path: &Path) -> bool;

    /// Remove the file or directory tree at `path`.
    fn remove(&self, path: &Path) -> bool;

    /// Copy the file at `from` to `to`, refusing to replace an existing file.
    fn copy(&self, from: &Path, to: &Path) -> bool;

    /// Replace the contents of `path` with `bytes`.
    fn write(&self, path: &Path, bytes: &[u8]) -> bool;

    /// Size of the file at `path` in bytes.
    fn size_of(&self, path: &Path) -> Option<u64>;

    /// Names of the entries directly inside `path`, sorted.
    fn list_directory(&self, path: &Path) -> Vec<String>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_directory(&self, path: &Path) -> bool {
        match std::fs::create_dir_all(path) {
            Ok(()) => {
                tracing::debug!("Directory created at {:?}", path);
                true
            }
            Err(e) => {
                tracing::warn!("Error creating directory at {:?}: {}", path, e);
                false
            }
        }
    }

    fn create_new(&self, path: &Path) -> bool {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!("Not creating {:?}: already exists", path);
                false
            }
            Err(e) => {
                tracing::warn!("Error creating file at {:?}: {}", path, e);
                false
            }
        }
    }

    fn remove(&self, path: &Path) -> bool {
        let result = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to remove {:?}: {}", path, e);
                false
            }
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> bool {
        if to.exists() {
            tracing::warn!("Cannot copy {:?}: {:?} already exists", from, to);
            return false;
        }
        match std::fs::copy(from, to) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to copy {:?} to {:?}: {}", from, to, e);
                false
            }
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> bool {
        match write_atomically(path, bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write {:?}: {}", path, e);
                false
            }
        }
    }

    fn size_of(&self, path: &Path) -> Option<u64> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Cannot stat {:?}: {}", path, e);
                None
            }
        }
    }

    fn list_directory(&self, path: &Path) -> Vec<String> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list {:?}: {}", path, e);
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Write to a sibling temp file first so readers never see a half-written file.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}
