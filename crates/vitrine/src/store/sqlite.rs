//! SQLite-backed record store.
//!
//! Two tables, one per owner kind. Legacy rows may carry full URLs in
//! `image_url`/`thumbnail_url` instead of bare names; those are read back as the
//! record's stored reference and rewritten to `filename` on the next upsert.

use super::{check_record, ImageRecordStore};
use crate::error::{Result, VitrineError};
use crate::model::{ImageRecord, NewImage, Owner, OwnerKind, RecordId};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS store_images (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id            INTEGER NOT NULL,
    filename            TEXT,
    thumbnail_filename  TEXT,
    image_url           TEXT,
    thumbnail_url       TEXT,
    is_primary          INTEGER NOT NULL DEFAULT 0,
    display_order       INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_store_images_owner ON store_images(store_id);

CREATE TABLE IF NOT EXISTS product_images (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id          INTEGER NOT NULL,
    store_id            INTEGER NOT NULL,
    filename            TEXT,
    thumbnail_filename  TEXT,
    image_url           TEXT,
    thumbnail_url       TEXT,
    is_primary          INTEGER NOT NULL DEFAULT 0,
    display_order       INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_product_images_owner ON product_images(store_id, product_id);
";

const STORE_COLUMNS: &str = "id, store_id, COALESCE(filename, image_url, ''), \
     COALESCE(thumbnail_filename, thumbnail_url), is_primary, display_order, created_at";

const PRODUCT_COLUMNS: &str = "id, store_id, product_id, COALESCE(filename, image_url, ''), \
     COALESCE(thumbnail_filename, thumbnail_url), is_primary, display_order, created_at";

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(VitrineError::Io)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Raw connection, for collaborators that own the rest of the schema.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn query_store_rows(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, store_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_product_rows(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, product_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    // SQLite's CURRENT_TIMESTAMP format, used by older rows.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn store_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let created_at: String = row.get(6)?;
    Ok(ImageRecord {
        id: RecordId::new(OwnerKind::Store, row.get::<_, i64>(0)? as u64),
        owner: Owner::store(row.get::<_, i64>(1)? as u64),
        filename: row.get(2)?,
        thumbnail_filename: row.get(3)?,
        is_primary: row.get::<_, i64>(4)? != 0,
        display_order: row.get(5)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn product_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let created_at: String = row.get(7)?;
    Ok(ImageRecord {
        id: RecordId::new(OwnerKind::Product, row.get::<_, i64>(0)? as u64),
        owner: Owner::product(
            row.get::<_, i64>(1)? as u64,
            row.get::<_, i64>(2)? as u64,
        ),
        filename: row.get(3)?,
        thumbnail_filename: row.get(4)?,
        is_primary: row.get::<_, i64>(5)? != 0,
        display_order: row.get(6)?,
        created_at: parse_timestamp(&created_at),
    })
}

impl ImageRecordStore for SqliteRecordStore {
    fn find_by_owner(&self, owner: &Owner) -> Result<Vec<ImageRecord>> {
        match *owner {
            Owner::Store { store_id } => self.query_store_rows(
                &format!(
                    "SELECT {} FROM store_images WHERE store_id = ?1 \
                     ORDER BY is_primary DESC, id DESC",
                    STORE_COLUMNS
                ),
                &[&(store_id as i64)],
            ),
            Owner::Product {
                store_id,
                product_id,
            } => self.query_product_rows(
                &format!(
                    "SELECT {} FROM product_images WHERE store_id = ?1 AND product_id = ?2 \
                     ORDER BY is_primary DESC, id DESC",
                    PRODUCT_COLUMNS
                ),
                &[&(store_id as i64), &(product_id as i64)],
            ),
        }
    }

    fn list_all(&self) -> Result<Vec<ImageRecord>> {
        let mut records = self.query_store_rows(
            &format!("SELECT {} FROM store_images ORDER BY id", STORE_COLUMNS),
            &[],
        )?;
        records.extend(self.query_product_rows(
            &format!("SELECT {} FROM product_images ORDER BY id", PRODUCT_COLUMNS),
            &[],
        )?);
        Ok(records)
    }

    fn insert(&mut self, image: NewImage) -> Result<ImageRecord> {
        let created_at = image.created_at.to_rfc3339();
        match image.owner {
            Owner::Store { store_id } => {
                self.conn.execute(
                    "INSERT INTO store_images
                        (store_id, filename, thumbnail_filename, is_primary, display_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        store_id as i64,
                        image.filename,
                        image.thumbnail_filename,
                        image.is_primary as i64,
                        image.display_order,
                        created_at,
                    ],
                )?;
            }
            Owner::Product {
                store_id,
                product_id,
            } => {
                self.conn.execute(
                    "INSERT INTO product_images
                        (product_id, store_id, filename, thumbnail_filename, is_primary, display_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        product_id as i64,
                        store_id as i64,
                        image.filename,
                        image.thumbnail_filename,
                        image.is_primary as i64,
                        image.display_order,
                        created_at,
                    ],
                )?;
            }
        }
        let seq = self.conn.last_insert_rowid() as u64;
        let kind = image.owner.kind();
        Ok(image.into_record(RecordId::new(kind, seq)))
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        check_record(record)?;
        let created_at = record.created_at.to_rfc3339();
        match record.owner {
            Owner::Store { store_id } => {
                self.conn.execute(
                    "INSERT INTO store_images
                        (id, store_id, filename, thumbnail_filename, is_primary, display_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        store_id = excluded.store_id,
                        filename = excluded.filename,
                        thumbnail_filename = excluded.thumbnail_filename,
                        image_url = NULL,
                        thumbnail_url = NULL,
                        is_primary = excluded.is_primary,
                        display_order = excluded.display_order,
                        created_at = excluded.created_at",
                    params![
                        record.id.seq as i64,
                        store_id as i64,
                        record.filename,
                        record.thumbnail_filename,
                        record.is_primary as i64,
                        record.display_order,
                        created_at,
                    ],
                )?;
            }
            Owner::Product {
                store_id,
                product_id,
            } => {
                self.conn.execute(
                    "INSERT INTO product_images
                        (id, product_id, store_id, filename, thumbnail_filename, is_primary, display_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        product_id = excluded.product_id,
                        store_id = excluded.store_id,
                        filename = excluded.filename,
                        thumbnail_filename = excluded.thumbnail_filename,
                        image_url = NULL,
                        thumbnail_url = NULL,
                        is_primary = excluded.is_primary,
                        display_order = excluded.display_order,
                        created_at = excluded.created_at",
                    params![
                        record.id.seq as i64,
                        product_id as i64,
                        store_id as i64,
                        record.filename,
                        record.thumbnail_filename,
                        record.is_primary as i64,
                        record.display_order,
                        created_at,
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn delete(&mut self, id: RecordId) -> Result<()> {
        let sql = match id.kind {
            OwnerKind::Store => "DELETE FROM store_images WHERE id = ?1",
            OwnerKind::Product => "DELETE FROM product_images WHERE id = ?1",
        };
        let removed = self.conn.execute(sql, params![id.seq as i64])?;
        if removed == 0 {
            return Err(VitrineError::RecordNotFound(id));
        }
        Ok(())
    }

    fn store_for_product(&self, product_id: u64) -> Result<Option<u64>> {
        let store_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT store_id FROM product_images WHERE product_id = ?1 ORDER BY id DESC LIMIT 1",
                params![product_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(store_id.map(|id| id as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_url_columns_are_read_as_references() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO product_images (product_id, store_id, image_url, thumbnail_url, is_primary, created_at)
                 VALUES (21, 3, '/uploads/stores/3/products/21/x.jpg', '/uploads/thumbnails/x.jpg', 1, '2023-05-01 10:00:00')",
                [],
            )
            .unwrap();

        let records = store.find_by_owner(&Owner::product(3, 21)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "/uploads/stores/3/products/21/x.jpg");
        assert_eq!(records[0].base_name().as_deref(), Some("x.jpg"));
        assert!(records[0].is_primary);
        assert_eq!(records[0].created_at.to_rfc3339(), "2023-05-01T10:00:00+00:00");
    }

    #[test]
    fn upsert_replaces_legacy_url() {
        let mut store = SqliteRecordStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO store_images (store_id, image_url, created_at)
                 VALUES (4, 'http://shop.test/uploads/a.jpg', '2023-05-01T10:00:00Z')",
                [],
            )
            .unwrap();

        let mut record = store.find_by_owner(&Owner::store(4)).unwrap().remove(0);
        record.filename = "a.jpg".to_string();
        store.upsert(&record).unwrap();

        let reloaded = store.find_by_owner(&Owner::store(4)).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].filename, "a.jpg");
        assert_eq!(reloaded[0].id, record.id);
    }
}
