use super::{check_record, ImageRecordStore};
use crate::error::{Result, VitrineError};
use crate::model::{ImageRecord, NewImage, Owner, OwnerKind, RecordId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    next_store_seq: u64,
    #[serde(default)]
    next_product_seq: u64,
    #[serde(default)]
    records: Vec<ImageRecord>,
}

impl RecordFile {
    fn allocate(&mut self, kind: OwnerKind) -> RecordId {
        let counter = match kind {
            OwnerKind::Store => &mut self.next_store_seq,
            OwnerKind::Product => &mut self.next_product_seq,
        };
        *counter += 1;
        RecordId::new(kind, *counter)
    }

    fn bump(&mut self, id: RecordId) {
        let counter = match id.kind {
            OwnerKind::Store => &mut self.next_store_seq,
            OwnerKind::Product => &mut self.next_product_seq,
        };
        *counter = (*counter).max(id.seq);
    }
}

/// Record store persisted as a single JSON document.
///
/// Every mutation rewrites the whole file through a temp file + rename, so a
/// crash never leaves a half-written document behind.
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RecordFile> {
        if !self.path.exists() {
            return Ok(RecordFile::default());
        }
        let content = fs::read_to_string(&self.path).map_err(VitrineError::Io)?;
        if content.trim().is_empty() {
            return Ok(RecordFile::default());
        }
        let file: RecordFile =
            serde_json::from_str(&content).map_err(VitrineError::Serialization)?;
        Ok(file)
    }

    fn save(&self, file: &RecordFile) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(VitrineError::Io)?;
        }

        let content = serde_json::to_string_pretty(file).map_err(VitrineError::Serialization)?;
        let tmp_file = dir.join(format!(".records-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_file, content).map_err(VitrineError::Io)?;
        fs::rename(&tmp_file, &self.path).map_err(VitrineError::Io)?;
        Ok(())
    }
}

impl ImageRecordStore for JsonRecordStore {
    fn find_by_owner(&self, owner: &Owner) -> Result<Vec<ImageRecord>> {
        Ok(self
            .load()?
            .records
            .into_iter()
            .filter(|r| r.owner == *owner)
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.load()?.records)
    }

    fn insert(&mut self, image: NewImage) -> Result<ImageRecord> {
        let mut file = self.load()?;
        let id = file.allocate(image.owner.kind());
        let record = image.into_record(id);
        file.records.push(record.clone());
        self.save(&file)?;
        Ok(record)
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        check_record(record)?;
        let mut file = self.load()?;
        match file.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => file.records.push(record.clone()),
        }
        file.bump(record.id);
        self.save(&file)
    }

    fn delete(&mut self, id: RecordId) -> Result<()> {
        let mut file = self.load()?;
        let before = file.records.len();
        file.records.retain(|r| r.id != id);
        if file.records.len() == before {
            return Err(VitrineError::RecordNotFound(id));
        }
        self.save(&file)
    }

    fn store_for_product(&self, product_id: u64) -> Result<Option<u64>> {
        Ok(self.load()?.records.iter().find_map(|r| match r.owner {
            Owner::Product {
                store_id,
                product_id: p,
            } if p == product_id => Some(store_id),
            _ => None,
        }))
    }
}
