//! # Configuration
//!
//! Configuration is managed by [`confique`], layered in priority order:
//! 1. **Environment variables**: `VITRINE_UPLOADS_ROOT`, `VITRINE_RECORD_BACKEND`, ...
//! 2. **Project Config**: `./vitrine.toml`
//! 3. **Global Config**: `vitrine.toml` in the OS config directory (via `directories`).
//! 4. **Compiled Defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `uploads_root` | `uploads` | Directory holding every uploaded image |
//! | `uploads_url_prefix` | `/uploads/` | URL prefix under which uploads are served |
//! | `record_backend` | `sqlite` | `sqlite` or `json` |
//! | `database` | `vitrine.db` | SQLite database (sqlite backend) |
//! | `records_file` | `records.json` | Record document (json backend) |
//! | `tie_break` | `newest-id` | `newest-id`, `newest-created` or `oldest-id` |
//! | `placeholder.filename` | `placeholder.png` | Reference written into unrecoverable records |
//! | `placeholder.asset` | `static/img/placeholder.png` | File served when nothing resolves |
//! | `placeholder.url` | `/static/img/placeholder.png` | Where clients fetch the placeholder |
//! | `placeholder.processing_url` | `/static/img/processing.png` | Shown while an upload is still local |
//! | `repair.dedupe` | `false` | Delete demoted duplicate primaries and their files |
//! | `repair.placeholder_unrecoverable` | `true` | Rewrite unrecoverable records to the placeholder |

use crate::error::Result;
use crate::reconcile::RepairPolicy;
use crate::resolver::TieBreakPolicy;
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "vitrine.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    Sqlite,
    Json,
}

/// Which placeholder asset to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderKind {
    Default,
    Unavailable,
    Error,
    Processing,
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderConfig {
    /// Filename written into records that can never resolve to a real image.
    #[config(env = "VITRINE_PLACEHOLDER_FILENAME", default = "placeholder.png")]
    pub filename: String,

    /// The well-known placeholder image, served whenever resolution fails.
    #[config(env = "VITRINE_PLACEHOLDER_ASSET", default = "static/img/placeholder.png")]
    pub asset: PathBuf,

    /// URL of the placeholder as seen by clients.
    #[config(default = "/static/img/placeholder.png")]
    pub url: String,

    /// Variant for images that exist but cannot be served right now.
    pub unavailable_asset: Option<PathBuf>,

    /// Variant for storage failures.
    pub error_asset: Option<PathBuf>,

    /// URL the client shows while an upload is still a local `blob:`.
    #[config(default = "/static/img/processing.png")]
    pub processing_url: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            filename: "placeholder.png".to_string(),
            asset: PathBuf::from("static/img/placeholder.png"),
            url: "/static/img/placeholder.png".to_string(),
            unavailable_asset: None,
            error_asset: None,
            processing_url: "/static/img/processing.png".to_string(),
        }
    }
}

impl PlaceholderConfig {
    /// Asset for a placeholder kind; variants fall back to the default asset.
    pub fn asset_for(&self, kind: PlaceholderKind) -> &Path {
        let variant = match kind {
            PlaceholderKind::Unavailable => self.unavailable_asset.as_deref(),
            PlaceholderKind::Error => self.error_asset.as_deref(),
            PlaceholderKind::Default | PlaceholderKind::Processing => None,
        };
        variant.unwrap_or(&self.asset)
    }
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RepairConfig {
    /// Delete demoted duplicate primaries (and their files) instead of keeping them.
    #[config(env = "VITRINE_REPAIR_DEDUPE", default = false)]
    pub dedupe: bool,

    /// Rewrite records whose file is gone everywhere to the placeholder filename.
    /// When false they are reported for manual attention instead.
    #[config(env = "VITRINE_REPAIR_PLACEHOLDER_UNRECOVERABLE", default = true)]
    pub placeholder_unrecoverable: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            dedupe: false,
            placeholder_unrecoverable: true,
        }
    }
}

/// Configuration for vitrine, stored in `vitrine.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VitrineConfig {
    /// Directory holding every uploaded image.
    #[config(env = "VITRINE_UPLOADS_ROOT", default = "uploads")]
    pub uploads_root: PathBuf,

    /// URL prefix under which the uploads root is served.
    #[config(env = "VITRINE_UPLOADS_URL_PREFIX", default = "/uploads/")]
    pub uploads_url_prefix: String,

    /// Where image records live: "sqlite" or "json".
    #[config(env = "VITRINE_RECORD_BACKEND", default = "sqlite")]
    pub record_backend: RecordBackend,

    /// SQLite database file (sqlite backend).
    #[config(env = "VITRINE_DATABASE", default = "vitrine.db")]
    pub database: PathBuf,

    /// Record document (json backend).
    #[config(env = "VITRINE_RECORDS_FILE", default = "records.json")]
    pub records_file: PathBuf,

    /// Which record wins when several compete for an owner's primary image.
    #[config(env = "VITRINE_TIE_BREAK", default = "newest-id")]
    pub tie_break: TieBreakPolicy,

    #[config(nested)]
    pub placeholder: PlaceholderConfig,

    #[config(nested)]
    pub repair: RepairConfig,
}

impl Default for VitrineConfig {
    fn default() -> Self {
        Self {
            uploads_root: PathBuf::from("uploads"),
            uploads_url_prefix: "/uploads/".to_string(),
            record_backend: RecordBackend::Sqlite,
            database: PathBuf::from("vitrine.db"),
            records_file: PathBuf::from("records.json"),
            tie_break: TieBreakPolicy::NewestId,
            placeholder: PlaceholderConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

impl VitrineConfig {
    /// Load from the environment and the given config directories, earlier
    /// directories taking precedence. Missing files are skipped.
    pub fn load(dirs: &[&Path]) -> Result<Self> {
        let mut builder = Self::builder().env();
        for dir in dirs {
            builder = builder.file(dir.join(CONFIG_FILE));
        }
        Ok(builder.load()?)
    }

    /// Commented TOML template with every key and its default.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }

    /// URL prefix normalized to `/prefix/`.
    pub fn url_prefix(&self) -> String {
        let trimmed = self.uploads_url_prefix.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        }
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        RepairPolicy {
            dedupe: self.repair.dedupe,
            placeholder_unrecoverable: self.repair.placeholder_unrecoverable,
            placeholder_filename: self.placeholder.filename.clone(),
        }
    }

    /// Resolve relative paths against `base` (the directory the config was found in).
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let absolutize = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        self.uploads_root = absolutize(self.uploads_root);
        self.database = absolutize(self.database);
        self.records_file = absolutize(self.records_file);
        self
    }
}
