use super::FileBackend;
use crate::error::{Result, VitrineError};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// In-memory uploads tree for testing.
///
/// Uses `RefCell` for interior mutability: the engine is single-threaded within
/// a request or a reconciliation run, and the trait takes `&self`.
#[derive(Default)]
pub struct MemFiles {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    escaping: RefCell<BTreeSet<String>>,
    fail_copies: RefCell<bool>,
    truncate_copies: RefCell<bool>,
}

impl MemFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let files = Self::new();
        for path in paths {
            files.put(path, b"image-bytes");
        }
        files
    }

    pub fn put(&self, relative: impl Into<String>, bytes: &[u8]) {
        self.files.borrow_mut().insert(relative.into(), bytes.to_vec());
    }

    /// Pretend `relative` is a symlink pointing outside the root.
    pub fn add_escaping_symlink(&self, relative: impl Into<String>) {
        let relative = relative.into();
        self.put(relative.clone(), b"outside");
        self.escaping.borrow_mut().insert(relative);
    }

    pub fn set_fail_copies(&self, fail: bool) {
        *self.fail_copies.borrow_mut() = fail;
    }

    /// Copies "succeed" but leave an empty destination, as a full disk might.
    pub fn set_truncate_copies(&self, truncate: bool) {
        *self.truncate_copies.borrow_mut() = truncate;
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl FileBackend for MemFiles {
    fn file_len(&self, relative: &str) -> Option<u64> {
        self.files.borrow().get(relative).map(|b| b.len() as u64)
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        PathBuf::from(format!("memory://uploads/{}", relative))
    }

    fn list_files(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self
            .files
            .borrow()
            .iter()
            .filter(|(path, _)| !path.rsplit('/').next().unwrap_or("").starts_with('.'))
            .map(|(path, bytes)| (path.clone(), bytes.len() as u64))
            .collect())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        if self.file_len(to).is_some_and(|len| len > 0) {
            return Ok(());
        }
        if *self.fail_copies.borrow() {
            return Err(VitrineError::Store("Simulated copy failure".to_string()));
        }
        let bytes = self
            .files
            .borrow()
            .get(from)
            .cloned()
            .ok_or_else(|| VitrineError::Store(format!("No such file: {}", from)))?;
        let bytes = if *self.truncate_copies.borrow() {
            Vec::new()
        } else {
            bytes
        };
        self.files.borrow_mut().insert(to.to_string(), bytes);
        Ok(())
    }

    fn remove(&self, relative: &str) -> Result<()> {
        self.files.borrow_mut().remove(relative);
        Ok(())
    }

    fn escapes_root(&self, relative: &str) -> bool {
        self.escaping.borrow().contains(relative)
    }
}
