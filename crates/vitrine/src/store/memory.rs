use super::{check_record, ImageRecordStore};
use crate::error::{Result, VitrineError};
use crate::model::{ImageRecord, NewImage, Owner, OwnerKind, RecordId};
use std::collections::{BTreeMap, HashMap};

/// In-memory record store for testing.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: BTreeMap<RecordId, ImageRecord>,
    next_seq: HashMap<OwnerKind, u64>,
    products: HashMap<u64, u64>,
    simulate_write_error: bool,
    simulate_read_error: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&mut self, simulate: bool) {
        self.simulate_write_error = simulate;
    }

    /// Make every read fail, as a broken database connection would.
    pub fn set_simulate_read_error(&mut self, simulate: bool) {
        self.simulate_read_error = simulate;
    }

    /// Register a product that has no images yet.
    pub fn register_product(&mut self, store_id: u64, product_id: u64) {
        self.products.insert(product_id, store_id);
    }

    fn check_read(&self) -> Result<()> {
        if self.simulate_read_error {
            return Err(VitrineError::Store("Simulated read error".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.simulate_write_error {
            return Err(VitrineError::Store("Simulated write error".to_string()));
        }
        Ok(())
    }
}

impl ImageRecordStore for MemoryRecordStore {
    fn find_by_owner(&self, owner: &Owner) -> Result<Vec<ImageRecord>> {
        self.check_read()?;
        Ok(self
            .records
            .values()
            .filter(|r| r.owner == *owner)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ImageRecord>> {
        self.check_read()?;
        Ok(self.records.values().cloned().collect())
    }

    fn insert(&mut self, image: NewImage) -> Result<ImageRecord> {
        self.check_write()?;
        let kind = image.owner.kind();
        let seq = self.next_seq.entry(kind).or_insert(0);
        *seq += 1;
        let record = image.into_record(RecordId::new(kind, *seq));
        if let Owner::Product {
            store_id,
            product_id,
        } = record.owner
        {
            self.products.insert(product_id, store_id);
        }
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        self.check_write()?;
        check_record(record)?;
        let seq = self.next_seq.entry(record.id.kind).or_insert(0);
        *seq = (*seq).max(record.id.seq);
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    fn delete(&mut self, id: RecordId) -> Result<()> {
        self.check_write()?;
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(VitrineError::RecordNotFound(id))
    }

    fn store_for_product(&self, product_id: u64) -> Result<Option<u64>> {
        self.check_read()?;
        Ok(self.products.get(&product_id).copied())
    }
}
