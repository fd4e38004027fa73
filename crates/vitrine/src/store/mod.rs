//! # Image Record Store
//!
//! The persisted rows describing known images. Every other component reaches the
//! records through the narrow [`ImageRecordStore`] trait only, so no SQL (or file
//! format) leaks into the resolver, the reconciler or the guard.
//!
//! ## Implementations
//!
//! - [`sqlite::SqliteRecordStore`]: production store over the `store_images` and
//!   `product_images` tables. Parameterized statements only.
//! - [`json::JsonRecordStore`]: a single `records.json`, written atomically.
//!   Handy for small deployments and for CLI tests.
//! - [`memory::MemoryRecordStore`]: in-memory store for testing logic without
//!   any I/O.
//!
//! ## Ordering
//!
//! `find_by_owner` makes no ordering promise. Consumers that need "the" image for
//! an owner apply a [`crate::resolver::TieBreakPolicy`] themselves.

use crate::error::{Result, VitrineError};
use crate::model::{ImageRecord, NewImage, Owner, RecordId};

pub mod json;
pub mod memory;
pub mod sqlite;

pub trait ImageRecordStore {
    /// All records attached to `owner`, in no particular order.
    fn find_by_owner(&self, owner: &Owner) -> Result<Vec<ImageRecord>>;

    /// Every record, both tables. Used to snapshot state for reconciliation.
    fn list_all(&self) -> Result<Vec<ImageRecord>>;

    /// Insert a new row; the store assigns the next id for the owner's table.
    fn insert(&mut self, image: NewImage) -> Result<ImageRecord>;

    /// Create or replace the row with `record.id`.
    fn upsert(&mut self, record: &ImageRecord) -> Result<()>;

    /// Delete a row. Deleting a missing row is an error.
    fn delete(&mut self, id: RecordId) -> Result<()>;

    /// The store a product belongs to, as far as the image tables know.
    fn store_for_product(&self, product_id: u64) -> Result<Option<u64>>;
}

/// Reject records whose id table disagrees with their owner.
pub(crate) fn check_record(record: &ImageRecord) -> Result<()> {
    if record.id.kind != record.owner.kind() {
        return Err(VitrineError::OwnerMismatch {
            id: record.id,
            owner: record.owner,
        });
    }
    Ok(())
}

/// Make `id` the only primary image of its owner.
///
/// Images uploaded later become primary this way; the previous primaries are
/// demoted but kept in the gallery.
pub fn promote<S: ImageRecordStore>(store: &mut S, id: RecordId) -> Result<ImageRecord> {
    let all = store.list_all()?;
    let target = all
        .iter()
        .find(|r| r.id == id)
        .cloned()
        .ok_or(VitrineError::RecordNotFound(id))?;

    for mut sibling in store.find_by_owner(&target.owner)? {
        let should_be_primary = sibling.id == id;
        if sibling.is_primary != should_be_primary {
            sibling.is_primary = should_be_primary;
            store.upsert(&sibling)?;
        }
    }

    Ok(ImageRecord {
        is_primary: true,
        ..target
    })
}
