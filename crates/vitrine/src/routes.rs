//! # HTTP-facing routes
//!
//! Framework-agnostic handlers for:
//!
//! - `GET /api/stores/{store_id}/primary-image`
//! - `GET /api/products/{product_id}/primary-image`
//! - `GET {uploads_url_prefix}...` (through the [`PathGuard`])
//!
//! Handlers return an [`ImageResponse`] describing what to stream. Image routes
//! never answer 404 or 500: a missing image is the placeholder with status 200.
//! The only non-200 status is 403 for requests the guard rejects.

use crate::config::{PlaceholderKind, VitrineConfig};
use crate::files::FileBackend;
use crate::guard::{GuardDecision, PathGuard};
use crate::model::Owner;
use crate::paths;
use crate::resolver::{PlaceholderReason, ResolvedImage, Resolver};
use crate::store::ImageRecordStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const STATUS_OK: u16 = 200;
pub const STATUS_FORBIDDEN: u16 = 403;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "kebab-case")]
pub enum ImageRoute {
    StorePrimary { store_id: u64 },
    ProductPrimary { product_id: u64 },
}

impl ImageRoute {
    pub fn parse(path: &str) -> Option<Self> {
        let end = path.find(['?', '#']).unwrap_or(path.len());
        let segments: Vec<&str> = path[..end].strip_prefix('/')?.split('/').collect();
        match segments.as_slice() {
            ["api", "stores", id, "primary-image"] => Some(ImageRoute::StorePrimary {
                store_id: paths::parse_id(id)?,
            }),
            ["api", "products", id, "primary-image"] => Some(ImageRoute::ProductPrimary {
                product_id: paths::parse_id(id)?,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResponse {
    pub status: u16,
    /// File to stream; `None` only for rejected requests.
    pub file: Option<PathBuf>,
    pub content_type: String,
    /// Set when `file` is a placeholder asset.
    pub placeholder: Option<PlaceholderKind>,
}

impl ImageResponse {
    pub fn file(path: PathBuf) -> Self {
        let content_type = content_type_of(&path);
        Self {
            status: STATUS_OK,
            file: Some(path),
            content_type,
            placeholder: None,
        }
    }

    pub fn placeholder(config: &VitrineConfig, kind: PlaceholderKind) -> Self {
        let asset = config.placeholder.asset_for(kind).to_path_buf();
        Self {
            status: STATUS_OK,
            content_type: content_type_of(&asset),
            file: Some(asset),
            placeholder: Some(kind),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: STATUS_FORBIDDEN,
            file: None,
            content_type: "text/plain".to_string(),
            placeholder: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }
}

fn content_type_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(paths::image_content_type)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// Owner a route is about. `Ok(None)` for products the image tables don't know.
pub fn route_owner<S: ImageRecordStore>(
    store: &S,
    route: ImageRoute,
) -> crate::error::Result<Option<Owner>> {
    match route {
        ImageRoute::StorePrimary { store_id } => Ok(Some(Owner::store(store_id))),
        ImageRoute::ProductPrimary { product_id } => Ok(store
            .store_for_product(product_id)?
            .map(|store_id| Owner::product(store_id, product_id))),
    }
}

pub fn primary_image<S: ImageRecordStore, F: FileBackend>(
    store: &S,
    files: &F,
    config: &VitrineConfig,
    route: ImageRoute,
) -> ImageResponse {
    let owner = match route_owner(store, route) {
        Ok(Some(owner)) => owner,
        Ok(None) => return ImageResponse::placeholder(config, PlaceholderKind::Default),
        Err(e) => {
            warn!(?route, error = %e, "owner lookup failed, serving placeholder");
            return ImageResponse::placeholder(config, PlaceholderKind::Error);
        }
    };

    let resolved = Resolver::new(store, files)
        .with_tie_break(config.tie_break)
        .with_placeholder_filename(config.placeholder.filename.clone())
        .resolve_primary(&owner);
    match resolved {
        ResolvedImage::File { path, .. } => ImageResponse::file(path),
        ResolvedImage::Placeholder {
            reason: PlaceholderReason::StoreError,
        } => ImageResponse::placeholder(config, PlaceholderKind::Error),
        ResolvedImage::Placeholder { .. } => {
            ImageResponse::placeholder(config, PlaceholderKind::Default)
        }
    }
}

/// `None` when the path is not under the uploads prefix.
pub fn serve_upload<F: FileBackend>(
    files: &F,
    config: &VitrineConfig,
    request_path: &str,
    owner: Option<&Owner>,
) -> Option<ImageResponse> {
    let guard = PathGuard::new(files, &config.uploads_url_prefix);
    match guard.check(request_path, owner) {
        GuardDecision::NotHandled => None,
        GuardDecision::Forbidden { .. } => Some(ImageResponse::forbidden()),
        GuardDecision::Serve { path, .. } => Some(ImageResponse::file(path)),
        GuardDecision::Placeholder { kind } => Some(ImageResponse::placeholder(config, kind)),
    }
}
