//! Run lock serializing reconciliation.
//!
//! Two concurrent runs could interleave copy and delete sequences, so a run
//! holds `.vitrine-reconcile.lock` in the uploads root for its whole duration.
//! The file is created exclusively and carries the holder's pid and start time
//! for diagnostics. It is removed on release or drop.

use crate::error::{Result, VitrineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = ".vitrine-reconcile.lock";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockMeta {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct ReconcileLock {
    path: PathBuf,
    released: bool,
}

impl ReconcileLock {
    /// Take the lock at `path`, failing with [`VitrineError::LockHeld`] when
    /// another run holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut file = match open_new_lock_file(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match read_meta(&path) {
                    Some(meta) => warn!(
                        path = %path.display(),
                        pid = meta.pid,
                        since = %meta.started_at,
                        "reconciliation lock is held"
                    ),
                    None => warn!(path = %path.display(), "reconciliation lock is held"),
                }
                return Err(VitrineError::LockHeld { path });
            }
            Err(e) => return Err(VitrineError::Io(e)),
        };

        let meta = serde_json::to_vec(&LockMeta::current())?;
        if let Err(e) = file.write_all(&meta).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(VitrineError::Io(e));
        }

        debug!(path = %path.display(), "reconciliation lock acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for ReconcileLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn open_new_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn read_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
