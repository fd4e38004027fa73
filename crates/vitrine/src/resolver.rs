//! # Primary Image Resolver
//!
//! Answers "which file represents this owner?" for page rendering. Absence is a
//! normal outcome: the resolver never fails, it returns a
//! [`ResolvedImage::Placeholder`] instead.
//!
//! ## Algorithm
//!
//! 1. Load the owner's records and order them by `is_primary` descending, then by
//!    the configured [`TieBreakPolicy`] (newest id first by default).
//! 2. Take the first record and compute its canonical path.
//! 3. If the canonical file exists, serve it.
//! 4. Otherwise probe a fixed, short list of legacy locations, first hit wins:
//!    a. the uploads root (pre-migration flat layout)
//!    b. `originals/`
//!    c. the top-level `thumbnails/`
//!    d. products only: the owning store's directory (images written one level
//!       too shallow)
//! 5. Nothing found: placeholder.
//!
//! The resolver is read-only. Inconsistencies it works around are left for the
//! reconciler to repair. Store failures degrade to the placeholder.

use crate::files::FileBackend;
use crate::model::{ImageRecord, Owner, RecordId};
use crate::paths::{self, StoredReference};
use crate::store::ImageRecordStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Which record wins among several competing for an owner's primary slot.
/// Primaries always sort before non-primaries; the policy breaks the remaining
/// ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreakPolicy {
    /// Highest id first (most recently created row).
    #[default]
    NewestId,
    /// Latest `created_at` first, then highest id.
    NewestCreated,
    /// Lowest id first.
    OldestId,
}

impl TieBreakPolicy {
    pub fn compare(&self, a: &ImageRecord, b: &ImageRecord) -> Ordering {
        let by_primary = b.is_primary.cmp(&a.is_primary);
        let by_policy = match self {
            TieBreakPolicy::NewestId => b.id.cmp(&a.id),
            TieBreakPolicy::NewestCreated => b
                .created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id)),
            TieBreakPolicy::OldestId => a.id.cmp(&b.id),
        };
        by_primary.then(by_policy)
    }

    pub fn sort(&self, records: &mut [ImageRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

/// Where a file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStep {
    Canonical,
    /// The location spelled out by a path-form record.
    RecordedPath,
    UploadsRoot,
    Originals,
    LegacyThumbnails,
    StoreDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub step: FallbackStep,
    pub path: String,
}

impl Location {
    fn new(step: FallbackStep, path: String) -> Self {
        Self { step, path }
    }
}

/// The canonical location followed by the bounded legacy fallbacks, in probe
/// order. Fails only when the filename is not a plain name.
pub fn search_candidates(owner: &Owner, filename: &str) -> crate::error::Result<Vec<Location>> {
    let canonical = paths::build_path(owner, filename)?;
    let mut candidates = vec![
        Location::new(FallbackStep::Canonical, canonical),
        Location::new(FallbackStep::UploadsRoot, filename.to_string()),
        Location::new(
            FallbackStep::Originals,
            format!("{}/{}", paths::ORIGINALS_DIR, filename),
        ),
        Location::new(
            FallbackStep::LegacyThumbnails,
            format!("{}/{}", paths::THUMBNAILS_DIR, filename),
        ),
    ];
    if let Owner::Product { store_id, .. } = owner {
        let store_dir = paths::build_path(&Owner::store(*store_id), filename)?;
        candidates.push(Location::new(FallbackStep::StoreDirectory, store_dir));
    }
    Ok(candidates)
}

/// Run the canonical + fallback search against any existence probe.
pub fn locate_with<P>(owner: &Owner, filename: &str, probe: P) -> Option<Location>
where
    P: Fn(&str) -> bool,
{
    search_candidates(owner, filename)
        .ok()?
        .into_iter()
        .find(|candidate| probe(&candidate.path))
}

/// Search a live uploads tree. A candidate counts only when it is non-empty and
/// stays inside the root.
pub fn locate_servable<F: FileBackend>(files: &F, owner: &Owner, filename: &str) -> Option<Location> {
    locate_with(owner, filename, |candidate| {
        files.has_content(candidate) && !files.escapes_root(candidate)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceholderReason {
    NoRecords,
    /// The winning record holds a blob URL, the placeholder name or garbage.
    Unresolvable,
    /// The file is nowhere to be found.
    Missing,
    StoreError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ResolvedImage {
    File {
        path: PathBuf,
        relative: String,
        record: RecordId,
        step: FallbackStep,
    },
    Placeholder {
        reason: PlaceholderReason,
    },
}

impl ResolvedImage {
    fn placeholder(reason: PlaceholderReason) -> Self {
        ResolvedImage::Placeholder { reason }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ResolvedImage::Placeholder { .. })
    }
}

pub struct Resolver<'a, S: ImageRecordStore, F: FileBackend> {
    store: &'a S,
    files: &'a F,
    tie_break: TieBreakPolicy,
    placeholder_filename: String,
}

impl<'a, S: ImageRecordStore, F: FileBackend> Resolver<'a, S, F> {
    pub fn new(store: &'a S, files: &'a F) -> Self {
        Self {
            store,
            files,
            tie_break: TieBreakPolicy::default(),
            placeholder_filename: "placeholder.png".to_string(),
        }
    }

    pub fn with_tie_break(mut self, policy: TieBreakPolicy) -> Self {
        self.tie_break = policy;
        self
    }

    pub fn with_placeholder_filename(mut self, filename: impl Into<String>) -> Self {
        self.placeholder_filename = filename.into();
        self
    }

    /// Canonical + bounded fallback search for one filename.
    pub fn locate(&self, owner: &Owner, filename: &str) -> Option<Location> {
        locate_servable(self.files, owner, filename)
    }

    /// The record that represents `owner`, if it has any.
    pub fn winning_record(&self, owner: &Owner) -> crate::error::Result<Option<ImageRecord>> {
        let mut records = self.store.find_by_owner(owner)?;
        self.tie_break.sort(&mut records);
        Ok(records.into_iter().next())
    }

    pub fn resolve_primary(&self, owner: &Owner) -> ResolvedImage {
        let record = match self.winning_record(owner) {
            Ok(Some(record)) => record,
            Ok(None) => return ResolvedImage::placeholder(PlaceholderReason::NoRecords),
            Err(e) => {
                warn!(%owner, error = %e, "image record lookup failed, serving placeholder");
                return ResolvedImage::placeholder(PlaceholderReason::StoreError);
            }
        };

        let reference = StoredReference::parse(&record.filename);
        let filename = match reference.base_name() {
            Some(name) if !reference.is_placeholder(&self.placeholder_filename) => name,
            _ => {
                debug!(%owner, record = %record.id, "primary record is not resolvable");
                return ResolvedImage::placeholder(PlaceholderReason::Unresolvable);
            }
        };

        match self.locate(owner, filename) {
            Some(location) => {
                if location.step != FallbackStep::Canonical {
                    debug!(
                        %owner,
                        record = %record.id,
                        step = ?location.step,
                        path = %location.path,
                        "primary image served from legacy location"
                    );
                }
                ResolvedImage::File {
                    path: self.files.absolute(&location.path),
                    relative: location.path,
                    record: record.id,
                    step: location.step,
                }
            }
            None => ResolvedImage::placeholder(PlaceholderReason::Missing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::mem::MemFiles;
    use crate::model::NewImage;
    use crate::store::memory::MemoryRecordStore;
    use chrono::{Duration, Utc};

    fn relative(resolved: &ResolvedImage) -> Option<&str> {
        match resolved {
            ResolvedImage::File { relative, .. } => Some(relative),
            ResolvedImage::Placeholder { .. } => None,
        }
    }

    #[test]
    fn missing_file_without_fallback_is_placeholder() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::store(4), "a.jpg").primary())
            .unwrap();
        let files = MemFiles::new();

        let resolved = Resolver::new(&store, &files).resolve_primary(&Owner::store(4));
        assert_eq!(
            resolved,
            ResolvedImage::Placeholder {
                reason: PlaceholderReason::Missing
            }
        );
    }

    #[test]
    fn legacy_flat_file_is_found() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::product(3, 21);
        store.insert(NewImage::new(owner, "x.jpg")).unwrap();
        let files = MemFiles::with_files(["x.jpg"]);

        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        match resolved {
            ResolvedImage::File { relative, step, .. } => {
                assert_eq!(relative, "x.jpg");
                assert_eq!(step, FallbackStep::UploadsRoot);
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn canonical_wins_over_fallbacks() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::product(3, 21);
        store.insert(NewImage::new(owner, "x.jpg")).unwrap();
        let files = MemFiles::with_files(["x.jpg", "stores/3/products/21/x.jpg"]);

        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        assert_eq!(relative(&resolved), Some("stores/3/products/21/x.jpg"));
    }

    #[test]
    fn empty_files_are_skipped() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::product(3, 21);
        store.insert(NewImage::new(owner, "x.jpg")).unwrap();
        let files = MemFiles::with_files(["originals/x.jpg"]);
        files.put("stores/3/products/21/x.jpg", b"");

        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        assert_eq!(relative(&resolved), Some("originals/x.jpg"));

        files.remove("originals/x.jpg").unwrap();
        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        assert_eq!(
            resolved,
            ResolvedImage::placeholder(PlaceholderReason::Missing)
        );
    }

    #[test]
    fn fallback_order_is_fixed() {
        let owner = Owner::product(3, 21);
        let files = MemFiles::with_files(["originals/x.jpg", "thumbnails/x.jpg", "stores/3/x.jpg"]);
        let store = MemoryRecordStore::new();
        let resolver = Resolver::new(&store, &files);
        assert_eq!(
            resolver.locate(&owner, "x.jpg").unwrap().step,
            FallbackStep::Originals
        );

        files.remove("originals/x.jpg").unwrap();
        assert_eq!(
            resolver.locate(&owner, "x.jpg").unwrap().step,
            FallbackStep::LegacyThumbnails
        );

        files.remove("thumbnails/x.jpg").unwrap();
        assert_eq!(
            resolver.locate(&owner, "x.jpg").unwrap().step,
            FallbackStep::StoreDirectory
        );
    }

    #[test]
    fn store_directory_fallback_is_product_only() {
        let files = MemFiles::with_files(["stores/3/x.jpg"]);
        let store = MemoryRecordStore::new();
        let resolver = Resolver::new(&store, &files);
        assert!(resolver.locate(&Owner::store(9), "x.jpg").is_none());
        assert!(resolver.locate(&Owner::product(3, 1), "x.jpg").is_some());
        assert!(resolver.locate(&Owner::product(4, 1), "x.jpg").is_none());
    }

    #[test]
    fn newest_primary_wins_by_default() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::store(3);
        store.insert(NewImage::new(owner, "a.jpg").primary()).unwrap();
        store.insert(NewImage::new(owner, "b.jpg").primary()).unwrap();
        store.insert(NewImage::new(owner, "c.jpg")).unwrap();
        let files = MemFiles::with_files(["stores/3/a.jpg", "stores/3/b.jpg", "stores/3/c.jpg"]);

        let resolver = Resolver::new(&store, &files);
        assert_eq!(relative(&resolver.resolve_primary(&owner)), Some("stores/3/b.jpg"));

        let resolver = Resolver::new(&store, &files).with_tie_break(TieBreakPolicy::OldestId);
        assert_eq!(relative(&resolver.resolve_primary(&owner)), Some("stores/3/a.jpg"));
    }

    #[test]
    fn newest_created_policy_uses_timestamps() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::store(3);
        let now = Utc::now();
        store
            .insert(NewImage::new(owner, "late.jpg").primary().created_at(now))
            .unwrap();
        store
            .insert(
                NewImage::new(owner, "early.jpg")
                    .primary()
                    .created_at(now - Duration::days(3)),
            )
            .unwrap();
        let files = MemFiles::with_files(["stores/3/late.jpg", "stores/3/early.jpg"]);

        let resolver = Resolver::new(&store, &files).with_tie_break(TieBreakPolicy::NewestCreated);
        assert_eq!(relative(&resolver.resolve_primary(&owner)), Some("stores/3/late.jpg"));
    }

    #[test]
    fn non_primary_records_still_resolve() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::store(8);
        store.insert(NewImage::new(owner, "only.jpg")).unwrap();
        let files = MemFiles::with_files(["stores/8/only.jpg"]);
        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        assert_eq!(relative(&resolved), Some("stores/8/only.jpg"));
    }

    #[test]
    fn blob_reference_never_touches_files() {
        let mut store = MemoryRecordStore::new();
        let owner = Owner::store(1);
        store
            .insert(NewImage::new(owner, "blob:http://host/abc").primary())
            .unwrap();
        // A file literally named like the blob id must not be picked up.
        let files = MemFiles::with_files(["abc", "stores/1/abc"]);

        let resolved = Resolver::new(&store, &files).resolve_primary(&owner);
        assert_eq!(
            resolved,
            ResolvedImage::Placeholder {
                reason: PlaceholderReason::Unresolvable
            }
        );
    }

    #[test]
    fn no_records_is_placeholder() {
        let store = MemoryRecordStore::new();
        let files = MemFiles::with_files(["stores/1/a.jpg"]);
        let resolved = Resolver::new(&store, &files).resolve_primary(&Owner::store(1));
        assert_eq!(
            resolved,
            ResolvedImage::Placeholder {
                reason: PlaceholderReason::NoRecords
            }
        );
    }

    #[test]
    fn store_errors_degrade_to_placeholder() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::store(1), "a.jpg").primary())
            .unwrap();
        store.set_simulate_read_error(true);
        let files = MemFiles::with_files(["stores/1/a.jpg"]);

        let resolved = Resolver::new(&store, &files).resolve_primary(&Owner::store(1));
        assert_eq!(
            resolved,
            ResolvedImage::Placeholder {
                reason: PlaceholderReason::StoreError
            }
        );
    }

    #[test]
    fn escaping_symlinks_are_not_served() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(NewImage::new(Owner::store(1), "a.jpg").primary())
            .unwrap();
        let files = MemFiles::new();
        files.add_escaping_symlink("stores/1/a.jpg");

        let resolved = Resolver::new(&store, &files).resolve_primary(&Owner::store(1));
        assert!(resolved.is_placeholder());
    }

    #[test]
    fn resolution_is_total_over_file_combinations() {
        let owner = Owner::product(2, 5);
        let locations = [
            "stores/2/products/5/p.jpg",
            "p.jpg",
            "originals/p.jpg",
            "thumbnails/p.jpg",
            "stores/2/p.jpg",
        ];
        let names = ["p.jpg", "blob:x", "", "../p.jpg", "placeholder.png"];

        for name in names {
            for mask in 0u32..(1 << locations.len()) {
                for record_count in 0..3 {
                    let mut store = MemoryRecordStore::new();
                    for i in 0..record_count {
                        let mut image = NewImage::new(owner, name);
                        image.is_primary = i % 2 == 0;
                        store.insert(image).unwrap();
                    }
                    let files = MemFiles::new();
                    for (bit, location) in locations.iter().enumerate() {
                        if mask & (1 << bit) != 0 {
                            files.put(*location, b"x");
                        }
                    }

                    match Resolver::new(&store, &files).resolve_primary(&owner) {
                        ResolvedImage::File { relative, .. } => {
                            assert!(files.exists(&relative), "served missing file {}", relative)
                        }
                        ResolvedImage::Placeholder { .. } => {}
                    }
                }
            }
        }
    }
}
