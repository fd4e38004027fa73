//! # Path Builder
//!
//! Maps an [`Owner`] and a filename to the one canonical location of that image,
//! relative to the uploads root, and parses such locations back.
//!
//! ```text
//! uploads/
//! ├── stores/{store_id}/{filename}
//! ├── stores/{store_id}/thumbnails/{filename}
//! ├── stores/{store_id}/products/{product_id}/{filename}
//! └── stores/{store_id}/products/{product_id}/thumbnails/{filename}
//! ```
//!
//! The builder rejects filenames containing separators or `..` instead of
//! sanitizing them; callers must validate upstream. The parser recognizes exactly
//! the two main-image shapes. Anything else (bare names, root-level files, the
//! historical `originals/` and `thumbnails/` trees) has no owner and is treated
//! as legacy by the resolver and the guard.
//!
//! Relative paths always use `/`, whatever the host platform.

use crate::error::{Result, VitrineError};
use crate::model::Owner;

pub const STORES_DIR: &str = "stores";
pub const PRODUCTS_DIR: &str = "products";
pub const THUMBNAILS_DIR: &str = "thumbnails";
pub const ORIGINALS_DIR: &str = "originals";

/// Leading path segment of legacy upload URLs (`/uploads/...`).
pub const UPLOADS_SEGMENT: &str = "uploads";

/// Check that `name` is a plain file name.
pub fn validate_filename(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        Err(VitrineError::InvalidFilename(name.to_string()))
    } else {
        Ok(name)
    }
}

/// Directory holding an owner's originals.
pub fn owner_dir(owner: &Owner) -> String {
    match owner {
        Owner::Store { store_id } => format!("{}/{}", STORES_DIR, store_id),
        Owner::Product {
            store_id,
            product_id,
        } => format!(
            "{}/{}/{}/{}",
            STORES_DIR, store_id, PRODUCTS_DIR, product_id
        ),
    }
}

pub fn build_path(owner: &Owner, filename: &str) -> Result<String> {
    let name = validate_filename(filename)?;
    Ok(format!("{}/{}", owner_dir(owner), name))
}

pub fn build_thumbnail_path(owner: &Owner, filename: &str) -> Result<String> {
    let name = validate_filename(filename)?;
    Ok(format!("{}/{}/{}", owner_dir(owner), THUMBNAILS_DIR, name))
}

/// A relative path that matched one of the canonical shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    pub owner: Owner,
    pub filename: String,
    pub thumbnail: bool,
}

/// Plain decimal ids only: no sign, no whitespace.
pub(crate) fn parse_id(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Parse any canonical shape, thumbnails included.
pub fn parse_canonical(relative: &str) -> Option<CanonicalPath> {
    let segments: Vec<&str> = relative.split('/').collect();

    let (owner, rest) = match segments.as_slice() {
        [STORES_DIR, store, PRODUCTS_DIR, product, rest @ ..] if !rest.is_empty() => {
            let owner = Owner::product(parse_id(store)?, parse_id(product)?);
            (owner, rest)
        }
        [STORES_DIR, store, rest @ ..] => (Owner::store(parse_id(store)?), rest),
        _ => return None,
    };

    let (filename, thumbnail) = match rest {
        [name] => (*name, false),
        [THUMBNAILS_DIR, name] => (*name, true),
        _ => return None,
    };

    validate_filename(filename).ok()?;
    Some(CanonicalPath {
        owner,
        filename: filename.to_string(),
        thumbnail,
    })
}

/// Inverse of [`build_path`]: only main-image shapes yield an owner.
pub fn parse_owner_from_path(relative: &str) -> Option<Owner> {
    parse_canonical(relative)
        .filter(|c| !c.thumbnail)
        .map(|c| c.owner)
}

/// What a record's `filename` column actually holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredReference {
    /// A plain file name, the expected form.
    Bare(String),
    /// A legacy full URL or `/uploads/...` path. `relative` is the location below
    /// the uploads root when it could be recovered safely.
    Path {
        relative: Option<String>,
        name: String,
    },
    /// A client-side `blob:` URL; never resolvable server-side.
    Blob,
    /// Empty, a `data:` URI, or a name the builder would reject.
    Unusable,
}

impl StoredReference {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();
        if raw.is_empty() || lower.starts_with("data:") {
            return StoredReference::Unusable;
        }
        if lower.starts_with("blob:") {
            return StoredReference::Blob;
        }
        if !raw.contains('/') && !raw.contains('\\') {
            return match validate_filename(raw) {
                Ok(name) => StoredReference::Bare(name.to_string()),
                Err(_) => StoredReference::Unusable,
            };
        }

        let path = url_path(raw).replace('\\', "/");
        let mut segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if segments.first() == Some(&UPLOADS_SEGMENT) {
            segments.remove(0);
        }

        let name = match segments.last() {
            Some(name) if validate_filename(name).is_ok() => name.to_string(),
            _ => return StoredReference::Unusable,
        };
        let relative = if segments.contains(&"..") {
            None
        } else {
            Some(segments.join("/"))
        };
        StoredReference::Path { relative, name }
    }

    pub fn base_name(&self) -> Option<&str> {
        match self {
            StoredReference::Bare(name) | StoredReference::Path { name, .. } => Some(name),
            StoredReference::Blob | StoredReference::Unusable => None,
        }
    }

    /// Owner encoded in a path-form reference, if any.
    pub fn encoded_owner(&self) -> Option<Owner> {
        match self {
            StoredReference::Path {
                relative: Some(rel),
                ..
            } => parse_owner_from_path(rel),
            _ => None,
        }
    }

    pub fn is_placeholder(&self, placeholder_filename: &str) -> bool {
        self.base_name() == Some(placeholder_filename)
    }
}

/// MIME type for an image file name, by extension. `None` for anything that is
/// not an image.
pub fn image_content_type(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(content_type)
}

/// Strip scheme, authority, query and fragment from a URL-ish string.
fn url_path(raw: &str) -> &str {
    let without_scheme = match raw.find("://") {
        Some(idx) => {
            let after = &raw[idx + 3..];
            after.find('/').map(|slash| &after[slash..]).unwrap_or("")
        }
        None => raw,
    };
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}
