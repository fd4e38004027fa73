//! # Core Data Types
//!
//! An image always belongs to an [`Owner`]: either a store, or a product nested
//! under its store. The owner is never created or destroyed here; it is owned by
//! the surrounding marketplace and only referenced by image records.
//!
//! [`ImageRecord`] mirrors one row of the store-image or product-image table.
//! Nothing about these rows is enforced transactionally, so every consumer must
//! tolerate:
//! - zero, one or many records per owner
//! - zero, one or many `is_primary` records per owner
//! - records whose file is missing, and files with no record
//! - records whose stored path points into another owner's directory
//! - records holding a client-side `blob:` URL that can never resolve

use crate::error::{Result, VitrineError};
use crate::paths::StoredReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which table an image row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Store,
    Product,
}

/// Who an image belongs to. Products always carry their parent store id because
/// product images are stored beneath the store's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Owner {
    Store { store_id: u64 },
    Product { store_id: u64, product_id: u64 },
}

impl Owner {
    pub fn store(store_id: u64) -> Self {
        Owner::Store { store_id }
    }

    pub fn product(store_id: u64, product_id: u64) -> Self {
        Owner::Product {
            store_id,
            product_id,
        }
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::Store { .. } => OwnerKind::Store,
            Owner::Product { .. } => OwnerKind::Product,
        }
    }

    pub fn store_id(&self) -> u64 {
        match self {
            Owner::Store { store_id } | Owner::Product { store_id, .. } => *store_id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Store { store_id } => write!(f, "store:{}", store_id),
            Owner::Product {
                store_id,
                product_id,
            } => write!(f, "product:{}:{}", store_id, product_id),
        }
    }
}

/// Parses `store:<id>` and `product:<store_id>:<product_id>`.
impl FromStr for Owner {
    type Err = VitrineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VitrineError::InvalidOwner(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        let id = |part: &str| part.parse::<u64>().map_err(|_| invalid());

        match parts.as_slice() {
            ["store", store_id] => Ok(Owner::store(id(store_id)?)),
            ["product", store_id, product_id] => {
                Ok(Owner::product(id(store_id)?, id(product_id)?))
            }
            _ => Err(invalid()),
        }
    }
}

/// Identity of an image row. Ids are assigned per table, so the kind is part of
/// the identity; within a single owner every id shares a kind and ordering falls
/// back to `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RecordId {
    pub kind: OwnerKind,
    pub seq: u64,
}

impl RecordId {
    pub fn new(kind: OwnerKind, seq: u64) -> Self {
        Self { kind, seq }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            OwnerKind::Store => 's',
            OwnerKind::Product => 'p',
        };
        write!(f, "{}{}", prefix, self.seq)
    }
}

impl FromStr for RecordId {
    type Err = VitrineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VitrineError::Api(format!("Invalid record id: {}", s));
        let kind = match s.chars().next() {
            Some('s') => OwnerKind::Store,
            Some('p') => OwnerKind::Product,
            _ => return Err(invalid()),
        };
        let seq = s[1..].parse::<u64>().map_err(|_| invalid())?;
        Ok(RecordId { kind, seq })
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RecordId {
    type Error = VitrineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// One persisted image row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RecordId,
    pub owner: Owner,
    /// Stored reference. Normally a bare filename; legacy rows hold full URLs,
    /// `/uploads/...` paths or client `blob:` URLs.
    pub filename: String,
    #[serde(default)]
    pub thumbnail_filename: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Classify the stored reference.
    pub fn reference(&self) -> StoredReference {
        StoredReference::parse(&self.filename)
    }

    /// The bare filename the reference points at, if it points at a file at all.
    pub fn base_name(&self) -> Option<String> {
        self.reference().base_name().map(str::to_string)
    }
}

/// Insertion draft; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub owner: Owner,
    pub filename: String,
    pub thumbnail_filename: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

impl NewImage {
    pub fn new(owner: Owner, filename: impl Into<String>) -> Self {
        Self {
            owner,
            filename: filename.into(),
            thumbnail_filename: None,
            is_primary: false,
            display_order: 0,
            created_at: Utc::now(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail_filename = Some(thumbnail.into());
        self
    }

    pub fn with_display_order(mut self, order: i32) -> Self {
        self.display_order = order;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn into_record(self, id: RecordId) -> ImageRecord {
        ImageRecord {
            id,
            owner: self.owner,
            filename: self.filename,
            thumbnail_filename: self.thumbnail_filename,
            is_primary: self.is_primary,
            display_order: self.display_order,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_parses_from_cli_syntax() {
        assert_eq!("store:4".parse::<Owner>().unwrap(), Owner::store(4));
        assert_eq!(
            "product:3:21".parse::<Owner>().unwrap(),
            Owner::product(3, 21)
        );
        assert!("product:3".parse::<Owner>().is_err());
        assert!("store:x".parse::<Owner>().is_err());
        assert!("user:1".parse::<Owner>().is_err());
    }

    #[test]
    fn owner_display_matches_parse() {
        let owner = Owner::product(7, 99);
        assert_eq!(owner.to_string(), "product:7:99");
        assert_eq!(owner.to_string().parse::<Owner>().unwrap(), owner);
    }

    #[test]
    fn record_id_text_form() {
        let id = RecordId::new(OwnerKind::Product, 12);
        assert_eq!(id.to_string(), "p12");
        assert_eq!("p12".parse::<RecordId>().unwrap(), id);
        assert_eq!(
            "s3".parse::<RecordId>().unwrap(),
            RecordId::new(OwnerKind::Store, 3)
        );
        assert!("x3".parse::<RecordId>().is_err());
        assert!("s".parse::<RecordId>().is_err());
    }

    #[test]
    fn record_serializes_id_as_string() {
        let record = NewImage::new(Owner::store(1), "a.jpg")
            .into_record(RecordId::new(OwnerKind::Store, 5));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "s5");
        assert_eq!(json["owner"]["kind"], "store");
        let back: ImageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn base_name_strips_legacy_url() {
        let record = NewImage::new(Owner::store(1), "http://shop.test/uploads/x.jpg")
            .into_record(RecordId::new(OwnerKind::Store, 1));
        assert_eq!(record.base_name().as_deref(), Some("x.jpg"));
    }
}
