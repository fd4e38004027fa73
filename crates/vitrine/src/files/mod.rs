//! # Uploads Tree Backend
//!
//! Raw file I/O over the uploads root. The [`FileBackend`] trait handles the
//! "how" (disk vs memory); the resolver, the guard and the reconciler decide the
//! "what".
//!
//! All paths handed to a backend are relative to the uploads root and use `/` as
//! separator. Backends never interpret them beyond joining them onto the root.
//!
//! ## Implementations
//!
//! - [`disk::DiskFiles`]: the real uploads directory.
//! - [`mem::MemFiles`]: in-memory tree for tests, with failure injection.

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub mod disk;
pub mod mem;

pub trait FileBackend {
    /// Size of the regular file at `relative`, or `None` when absent.
    /// Lookup failures (permissions, broken links) count as absent.
    fn file_len(&self, relative: &str) -> Option<u64>;

    fn exists(&self, relative: &str) -> bool {
        self.file_len(relative).is_some()
    }

    /// Present and non-empty. Zero-byte files are interrupted writes and are
    /// never served.
    fn has_content(&self, relative: &str) -> bool {
        self.file_len(relative).is_some_and(|len| len > 0)
    }

    /// Absolute location to stream back to a client.
    fn absolute(&self, relative: &str) -> PathBuf;

    /// Every regular file below the root with its size. Dot-files (lock files,
    /// in-flight temp files) are skipped.
    fn list_files(&self) -> Result<BTreeMap<String, u64>>;

    /// Copy `from` to `to`, creating parent directories. The destination only
    /// appears once fully written. A non-empty destination is left untouched.
    fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Remove a file. Removing a missing file is not an error.
    fn remove(&self, relative: &str) -> Result<()>;

    /// True when `relative` exists but resolves (through symlinks) outside the
    /// root.
    fn escapes_root(&self, relative: &str) -> bool;
}
