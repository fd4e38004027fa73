//! # Context Initialization
//!
//! Turns a working directory into a ready [`VitrineApi`]: find the project,
//! load the layered configuration, open the configured record store and point a
//! [`DiskFiles`] at the uploads root.
//!
//! ## Project Detection
//!
//! [`find_project_root`] walks up from `CWD` looking for a directory holding a
//! `vitrine.toml`. The first match is the project root; relative paths in the
//! configuration (`uploads_root`, `database`, `records_file`) are resolved
//! against it. With no `vitrine.toml` anywhere up to `HOME` or the filesystem
//! root, the working directory itself is the project root.
//!
//! ## Configuration Lookup
//!
//! 1. `<project_root>/vitrine.toml`
//! 2. `vitrine.toml` in the global config directory. `VITRINE_CONFIG_DIR`
//!    overrides the OS default, mostly so tests can isolate themselves.
//!
//! Environment variables beat both files (see [`crate::config`]).
//!
//! ## Uploads Override
//!
//! `uploads_override` (the CLI's `--uploads`) replaces the configured uploads
//! root. A relative override is taken relative to `CWD`, not the project.

use crate::api::VitrineApi;
use crate::commands::VitrinePaths;
use crate::config::{RecordBackend, VitrineConfig, CONFIG_FILE};
use crate::error::Result;
use crate::files::disk::DiskFiles;
use crate::model::{ImageRecord, NewImage, Owner, RecordId};
use crate::reconcile::LOCK_FILE;
use crate::store::json::JsonRecordStore;
use crate::store::sqlite::SqliteRecordStore;
use crate::store::ImageRecordStore;
use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_DIR_ENV: &str = "VITRINE_CONFIG_DIR";

/// The record store picked by `record_backend`.
pub enum ConfiguredStore {
    Sqlite(SqliteRecordStore),
    Json(JsonRecordStore),
}

impl ConfiguredStore {
    pub fn open(config: &VitrineConfig) -> Result<Self> {
        match config.record_backend {
            RecordBackend::Sqlite => {
                debug!(database = %config.database.display(), "opening sqlite record store");
                Ok(Self::Sqlite(SqliteRecordStore::open(&config.database)?))
            }
            RecordBackend::Json => {
                debug!(file = %config.records_file.display(), "opening json record store");
                Ok(Self::Json(JsonRecordStore::new(&config.records_file)))
            }
        }
    }

    fn inner(&self) -> &dyn ImageRecordStore {
        match self {
            Self::Sqlite(store) => store,
            Self::Json(store) => store,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ImageRecordStore {
        match self {
            Self::Sqlite(store) => store,
            Self::Json(store) => store,
        }
    }
}

impl ImageRecordStore for ConfiguredStore {
    fn find_by_owner(&self, owner: &Owner) -> Result<Vec<ImageRecord>> {
        self.inner().find_by_owner(owner)
    }

    fn list_all(&self) -> Result<Vec<ImageRecord>> {
        self.inner().list_all()
    }

    fn insert(&mut self, image: NewImage) -> Result<ImageRecord> {
        self.inner_mut().insert(image)
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        self.inner_mut().upsert(record)
    }

    fn delete(&mut self, id: RecordId) -> Result<()> {
        self.inner_mut().delete(id)
    }

    fn store_for_product(&self, product_id: u64) -> Result<Option<u64>> {
        self.inner().store_for_product(product_id)
    }
}

pub struct VitrineContext {
    pub api: VitrineApi<ConfiguredStore, DiskFiles>,
    pub project_root: PathBuf,
    pub config: VitrineConfig,
}

/// Walk up from `cwd` to the nearest directory holding a `vitrine.toml`.
/// Stops at the home directory or the filesystem root.
pub fn find_project_root(cwd: &Path) -> Option<PathBuf> {
    let home_dir = BaseDirs::new().map(|bd| bd.home_dir().to_path_buf());
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Some(current);
        }

        if let Some(ref home) = home_dir {
            if &current == home {
                return None;
            }
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent.to_path_buf();
            }
            _ => return None,
        }
    }
}

/// Global configuration directory, if the platform has one.
pub fn global_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    ProjectDirs::from("com", "vitrine", "vitrine").map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn initialize(cwd: &Path, uploads_override: Option<PathBuf>) -> Result<VitrineContext> {
    let project_root = find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());

    let mut config_dirs = vec![project_root.clone()];
    if let Some(global) = global_config_dir() {
        config_dirs.push(global);
    }
    let lookup: Vec<&Path> = config_dirs.iter().map(PathBuf::as_path).collect();

    let mut config = VitrineConfig::load(&lookup)?.rooted_at(&project_root);
    if let Some(uploads) = uploads_override {
        config.uploads_root = if uploads.is_absolute() {
            uploads
        } else {
            cwd.join(uploads)
        };
    }
    debug!(
        project = %project_root.display(),
        uploads = %config.uploads_root.display(),
        backend = ?config.record_backend,
        "vitrine context initialized"
    );

    let store = ConfiguredStore::open(&config)?;
    let files = DiskFiles::new(&config.uploads_root);
    let paths = VitrinePaths {
        uploads_root: config.uploads_root.clone(),
        lock_file: config.uploads_root.join(LOCK_FILE),
        config_dirs,
    };

    Ok(VitrineContext {
        api: VitrineApi::new(store, files, config.clone(), paths),
        project_root,
        config,
    })
}
