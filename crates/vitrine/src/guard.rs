//! # Path Security Guard
//!
//! Sits in front of everything streamed from the uploads root. Given the raw
//! request path (and, when the route knows it, the owner the request is about),
//! it decides what may be served:
//!
//! 1. Paths outside the uploads URL prefix are [`GuardDecision::NotHandled`].
//! 2. The rest is percent-decoded and normalized lexically. Anything that climbs
//!    out of the root, contains a NUL byte, or resolves through a symlink to a
//!    location outside the root is [`GuardDecision::Forbidden`]. This is the only
//!    hard failure.
//! 3. Canonical paths are served as-is. A canonical main image that is missing
//!    falls back to the owner's bounded search.
//! 4. Other image paths are searched for in the inferred owner's directories
//!    first, then served verbatim if they exist.
//! 5. Everything else degrades to the placeholder.

use crate::config::PlaceholderKind;
use crate::files::FileBackend;
use crate::model::Owner;
use crate::paths;
use crate::resolver::{locate_servable, FallbackStep};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum GuardDecision {
    Serve {
        relative: String,
        path: PathBuf,
        /// `None` when the requested path was served verbatim.
        step: Option<FallbackStep>,
    },
    Placeholder {
        kind: PlaceholderKind,
    },
    Forbidden {
        reason: String,
    },
    NotHandled,
}

pub struct PathGuard<'a, F: FileBackend> {
    files: &'a F,
    prefix: String,
}

impl<'a, F: FileBackend> PathGuard<'a, F> {
    /// `prefix` is the URL prefix the uploads root is mounted under, e.g.
    /// `/uploads/`.
    pub fn new(files: &'a F, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };
        Self { files, prefix }
    }

    pub fn check(&self, request_path: &str, owner: Option<&Owner>) -> GuardDecision {
        let path = strip_query(request_path);
        let Some(decoded) = percent_decode(path) else {
            return forbidden(request_path, "undecodable path");
        };
        let Some(rest) = decoded.strip_prefix(&self.prefix) else {
            return GuardDecision::NotHandled;
        };
        if rest.contains('\0') {
            return forbidden(request_path, "NUL byte in path");
        }
        let Some(relative) = normalize(rest) else {
            return forbidden(request_path, "path escapes the uploads root");
        };
        if relative.is_empty() {
            return placeholder();
        }
        if self.files.escapes_root(&relative) {
            return forbidden(request_path, "symlink escapes the uploads root");
        }

        if let Some(canonical) = paths::parse_canonical(&relative) {
            if self.files.has_content(&relative) {
                return self.serve(relative, None);
            }
            if canonical.thumbnail {
                return placeholder();
            }
            return self.search(&canonical.owner, &canonical.filename);
        }

        let name = relative.rsplit('/').next().unwrap_or(&relative).to_string();
        if let Some(owner) = owner {
            if paths::image_content_type(&name).is_some() {
                if let Some(location) = locate_servable(self.files, owner, &name) {
                    debug!(%owner, requested = %relative, found = %location.path, "served from owner search");
                    return self.serve(location.path, Some(location.step));
                }
            }
        }

        if self.files.has_content(&relative) {
            return self.serve(relative, None);
        }
        placeholder()
    }

    fn search(&self, owner: &Owner, filename: &str) -> GuardDecision {
        match locate_servable(self.files, owner, filename) {
            Some(location) => self.serve(location.path, Some(location.step)),
            None => placeholder(),
        }
    }

    fn serve(&self, relative: String, step: Option<FallbackStep>) -> GuardDecision {
        GuardDecision::Serve {
            path: self.files.absolute(&relative),
            relative,
            step,
        }
    }
}

fn placeholder() -> GuardDecision {
    GuardDecision::Placeholder {
        kind: PlaceholderKind::Default,
    }
}

fn forbidden(request_path: &str, reason: &str) -> GuardDecision {
    warn!(path = %request_path.escape_debug(), reason, "rejected upload request");
    GuardDecision::Forbidden {
        reason: reason.to_string(),
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Decode `%XX` escapes. Malformed escapes are kept literally; `None` when the
/// result is not UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Resolve `.` and `..` lexically. `None` when the path climbs above the root.
fn normalize(rest: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::mem::MemFiles;

    fn relative(decision: &GuardDecision) -> Option<&str> {
        match decision {
            GuardDecision::Serve { relative, .. } => Some(relative),
            _ => None,
        }
    }

    fn is_forbidden(decision: &GuardDecision) -> bool {
        matches!(decision, GuardDecision::Forbidden { .. })
    }

    #[test]
    fn traversal_is_forbidden() {
        let files = MemFiles::with_files(["stores/1/a.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        for path in [
            "/uploads/../etc/passwd",
            "/uploads/stores/../../etc/passwd",
            "/uploads/%2e%2e/etc/passwd",
            "/uploads/%2E%2E%2Fetc%2Fpasswd",
            "/uploads/..\\secrets.txt",
            "/uploads/stores/1/a.jpg%00.png",
        ] {
            assert!(is_forbidden(&guard.check(path, None)), "{}", path);
        }
    }

    #[test]
    fn inner_dot_segments_are_fine() {
        let files = MemFiles::with_files(["stores/1/a.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        let decision = guard.check("/uploads/stores/2/../1/./a.jpg", None);
        assert_eq!(relative(&decision), Some("stores/1/a.jpg"));
    }

    #[test]
    fn escaping_symlink_is_forbidden() {
        let files = MemFiles::new();
        files.add_escaping_symlink("stores/1/evil.jpg");
        let guard = PathGuard::new(&files, "/uploads/");
        assert!(is_forbidden(&guard.check("/uploads/stores/1/evil.jpg", None)));
    }

    #[test]
    fn other_prefixes_are_not_handled() {
        let files = MemFiles::new();
        let guard = PathGuard::new(&files, "uploads");
        assert_eq!(guard.check("/static/app.js", None), GuardDecision::NotHandled);
        assert_eq!(guard.check("/uploadsx/a.jpg", None), GuardDecision::NotHandled);
    }

    #[test]
    fn canonical_paths_pass_through() {
        let files = MemFiles::with_files(["stores/3/products/21/x.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        let decision = guard.check("/uploads/stores/3/products/21/x.jpg?v=3", None);
        assert_eq!(
            decision,
            GuardDecision::Serve {
                relative: "stores/3/products/21/x.jpg".into(),
                path: PathBuf::from("memory://uploads/stores/3/products/21/x.jpg"),
                step: None
            }
        );
    }

    #[test]
    fn missing_canonical_image_falls_back() {
        let files = MemFiles::with_files(["x.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        match guard.check("/uploads/stores/3/products/21/x.jpg", None) {
            GuardDecision::Serve { relative, step, .. } => {
                assert_eq!(relative, "x.jpg");
                assert_eq!(step, Some(FallbackStep::UploadsRoot));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_canonical_file_falls_back() {
        let files = MemFiles::with_files(["originals/a.jpg"]);
        files.put("stores/1/a.jpg", b"");
        let guard = PathGuard::new(&files, "/uploads/");
        let decision = guard.check("/uploads/stores/1/a.jpg", None);
        assert_eq!(relative(&decision), Some("originals/a.jpg"));

        files.put("stores/1/thumbnails/a.jpg", b"");
        assert!(matches!(
            guard.check("/uploads/stores/1/thumbnails/a.jpg", None),
            GuardDecision::Placeholder { .. }
        ));
    }

    #[test]
    fn missing_thumbnail_is_placeholder() {
        let files = MemFiles::with_files(["stores/3/a.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        assert_eq!(
            guard.check("/uploads/stores/3/thumbnails/a.jpg", None),
            GuardDecision::Placeholder {
                kind: PlaceholderKind::Default
            }
        );
    }

    #[test]
    fn inferred_owner_is_searched_before_verbatim() {
        let files = MemFiles::with_files(["legacy/x.jpg", "stores/2/x.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        let owner = Owner::store(2);
        assert_eq!(
            relative(&guard.check("/uploads/legacy/x.jpg", Some(&owner))),
            Some("stores/2/x.jpg")
        );
        assert_eq!(
            relative(&guard.check("/uploads/legacy/x.jpg", None)),
            Some("legacy/x.jpg")
        );
    }

    #[test]
    fn non_images_are_not_searched() {
        let files = MemFiles::with_files(["stores/2/notes.txt"]);
        let guard = PathGuard::new(&files, "/uploads/");
        let owner = Owner::store(2);
        assert!(matches!(
            guard.check("/uploads/notes.txt", Some(&owner)),
            GuardDecision::Placeholder { .. }
        ));
    }

    #[test]
    fn missing_legacy_path_is_placeholder() {
        let files = MemFiles::new();
        let guard = PathGuard::new(&files, "/uploads/");
        assert!(matches!(
            guard.check("/uploads/old/a.jpg", None),
            GuardDecision::Placeholder { .. }
        ));
        assert!(matches!(
            guard.check("/uploads/", None),
            GuardDecision::Placeholder { .. }
        ));
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("a%20b.jpg").as_deref(), Some("a b.jpg"));
        assert_eq!(percent_decode("100%").as_deref(), Some("100%"));
        assert_eq!(percent_decode("%zz").as_deref(), Some("%zz"));
        assert_eq!(percent_decode("%ff"), None);
        assert_eq!(percent_decode("%+2x").as_deref(), Some("%+2x"));
        assert_eq!(percent_decode("%-1x").as_deref(), Some("%-1x"));
        assert_eq!(percent_decode("%2Fx").as_deref(), Some("/x"));
    }

    #[test]
    fn signed_escapes_stay_literal() {
        let files = MemFiles::with_files(["stores/1/%+2.jpg"]);
        let guard = PathGuard::new(&files, "/uploads/");
        let decision = guard.check("/uploads/stores/1/%+2.jpg", None);
        assert_eq!(relative(&decision), Some("stores/1/%+2.jpg"));
    }
}
