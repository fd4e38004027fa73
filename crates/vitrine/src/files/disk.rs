use super::FileBackend;
use crate::error::{Result, VitrineError};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;
use walkdir::WalkDir;

/// The uploads directory on disk.
pub struct DiskFiles {
    root: PathBuf,
}

impl DiskFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(VitrineError::Io)?;
        }
        Ok(())
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Key walked files by their `/`-joined path under `root`. Entries that fail
/// to read are logged and left out of the listing.
fn collect_listing<E: Display>(
    root: &Path,
    entries: impl IntoIterator<Item = std::result::Result<(PathBuf, u64), E>>,
) -> BTreeMap<String, u64> {
    let mut files = BTreeMap::new();
    let mut skipped = 0usize;
    for entry in entries {
        let (path, len) = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable upload entry");
                skipped += 1;
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        // Non UTF-8 names can never be referenced by a record.
        let Some(segments) = segments else {
            continue;
        };
        files.insert(segments.join("/"), len);
    }
    if skipped > 0 {
        warn!(skipped, root = %root.display(), "upload listing is partial");
    }
    files
}

impl FileBackend for DiskFiles {
    fn file_len(&self, relative: &str) -> Option<u64> {
        let meta = fs::metadata(self.full_path(relative)).ok()?;
        meta.is_file().then(|| meta.len())
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.full_path(relative)
    }

    fn list_files(&self) -> Result<BTreeMap<String, u64>> {
        if !self.root.exists() {
            return Ok(BTreeMap::new());
        }

        // Only the root is fatal. Read as empty it would mark every record missing.
        fs::read_dir(&self.root).map_err(VitrineError::Io)?;

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|entry| match entry {
                Ok(e) if !e.file_type().is_file() => None,
                Ok(e) => {
                    let len = e.metadata().map(|m| m.len()).unwrap_or(0);
                    Some(Ok((e.into_path(), len)))
                }
                Err(e) => Some(Err(e)),
            });

        Ok(collect_listing(&self.root, walker))
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        if self.file_len(to).is_some_and(|len| len > 0) {
            return Ok(());
        }

        let source = self.full_path(from);
        let target = self.full_path(to);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_dir(&dir)?;

        // Atomic: the destination only appears fully written.
        let tmp_path = dir.join(format!(".vitrine-{}.tmp", Uuid::new_v4()));
        if let Err(e) = fs::copy(&source, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(VitrineError::Io(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &target) {
            let _ = fs::remove_file(&tmp_path);
            return Err(VitrineError::Io(e));
        }
        Ok(())
    }

    fn remove(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.full_path(relative)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VitrineError::Io(e)),
        }
    }

    fn escapes_root(&self, relative: &str) -> bool {
        let candidate = self.full_path(relative);
        if fs::symlink_metadata(&candidate).is_err() {
            return false;
        }
        let (Ok(root), Ok(resolved)) = (self.root.canonicalize(), candidate.canonicalize()) else {
            // Dangling links cannot be served either way.
            return true;
        };
        !resolved.starts_with(root)
    }
}
