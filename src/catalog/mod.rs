//! SQLite-backed catalog of collected files.
//!
//! All reads and writes go through a single [`Connection`]. Writes are
//! grouped into per-batch transactions by the engine via [`CatalogStore::begin_batch`]
//! and [`CatalogStore::commit_batch`], so a crash loses at most the
//! in-flight batch.

mod record;
mod schema;

pub use record::{FileRecord, MediaType};

use chrono::NaiveDateTime;
use rusqlite::{Connection, ErrorCode, Row};
use std::path::Path;
use tracing::debug;

use crate::error::{IngestError, Result};
use schema::SCHEMA;

/// Textual timestamp encoding. ISO field order so lexicographic comparison
/// matches temporal order.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn encode_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn decode_ts(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Open (creating if necessary) the catalog at `path` and apply the
    /// schema idempotently.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Total number of cataloged records.
    pub fn count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT count(1) FROM file_info", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Records already registered under a (partition, name) destination key.
    /// Used both for "already cataloged" checks and collision probing.
    pub fn find_by_destination(&self, save_to: &str, name: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, path, size, hash, created_at, modified_at, file_type, captured_at, save_to FROM file_info WHERE save_to = ?1 AND name = ?2")?;
        let records = stmt
            .query_map(rusqlite::params![save_to, name], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// The dedup lookup: exact match on the (size, hash, captured_at)
    /// triple. Uses SQL `IS` so two unset capture times compare equal here,
    /// even though the storage-level unique constraint treats NULLs as
    /// distinct.
    pub fn find_by_content(
        &self,
        size: i64,
        hash: &str,
        captured_at: Option<&NaiveDateTime>,
    ) -> Result<Option<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, path, size, hash, created_at, modified_at, file_type, captured_at, save_to FROM file_info WHERE size = ?1 AND hash = ?2 AND captured_at IS ?3")?;
        let captured = captured_at.map(encode_ts);
        let mut rows = stmt.query_map(rusqlite::params![size, hash, captured], row_to_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert a new record, returning it with its assigned id.
    ///
    /// A uniqueness violation here means the caller's dedup or collision
    /// check disagreed with the catalog state; it is reported as
    /// [`IngestError::Duplicate`] and treated as fatal upstream.
    pub fn register(&self, record: &FileRecord) -> Result<FileRecord> {
        debug!(name = %record.name, save_to = %record.save_to, "registering file record");
        let result = self.conn.execute(
            "INSERT INTO file_info (name, path, size, hash, created_at, modified_at, file_type, captured_at, save_to) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.name,
                record.path,
                record.size,
                record.hash,
                encode_ts(&record.created_at),
                encode_ts(&record.modified_at),
                record.file_type.as_str(),
                record.captured_at.as_ref().map(encode_ts),
                record.save_to,
            ],
        );
        match result {
            Ok(_) => {
                let mut registered = record.clone();
                registered.id = Some(self.conn.last_insert_rowid());
                Ok(registered)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(IngestError::Duplicate {
                    save_to: record.save_to.clone(),
                    name: record.name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open the write transaction for one walker batch.
    pub fn begin_batch(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Flush one batch worth of writes. An uncommitted transaction is
    /// rolled back when the connection drops, capping crash loss to the
    /// in-flight batch.
    pub fn commit_batch(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let created: String = row.get(5)?;
    let modified: String = row.get(6)?;
    let file_type: String = row.get(7)?;
    let captured: Option<String> = row.get(8)?;
    Ok(FileRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        size: row.get(3)?,
        hash: row.get(4)?,
        created_at: decode_ts(5, &created)?,
        modified_at: decode_ts(6, &modified)?,
        file_type: MediaType::parse(&file_type),
        captured_at: match captured {
            Some(s) => Some(decode_ts(8, &s)?),
            None => None,
        },
        save_to: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 4, 17)
            .unwrap()
            .and_hms_opt(h, 44, 37)
            .unwrap()
    }

    fn record(name: &str, hash: &str, captured_at: Option<NaiveDateTime>) -> FileRecord {
        FileRecord::new(
            name.to_string(),
            "/photos/src".to_string(),
            42,
            hash.to_string(),
            ts(9),
            ts(10),
            MediaType::Image,
            captured_at,
            "2019/04".to_string(),
        )
        .unwrap()
    }

    fn open_store(dir: &tempfile::TempDir) -> CatalogStore {
        CatalogStore::open(&dir.path().join("catalog.db")).unwrap()
    }

    #[test]
    fn test_register_assigns_id_and_counts() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.count().unwrap(), 0);
        let registered = store.register(&record("a.jpg", "aaa", Some(ts(11)))).unwrap();
        assert!(registered.id.is_some());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_find_by_destination() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&record("a.jpg", "aaa", Some(ts(11)))).unwrap();
        let found = store.find_by_destination("2019/04", "a.jpg").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a.jpg");
        assert_eq!(found[0].file_type, MediaType::Image);
        assert_eq!(found[0].captured_at, Some(ts(11)));

        assert!(store.find_by_destination("2019/05", "a.jpg").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_content_null_capture_times_match() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&record("a.txt", "aaa", None)).unwrap();
        // NULL captured_at uses IS semantics in the lookup.
        let found = store.find_by_content(42, "aaa", None).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, "a.txt");

        assert!(store.find_by_content(42, "aaa", Some(&ts(11))).unwrap().is_none());
        assert!(store.find_by_content(43, "aaa", None).unwrap().is_none());
    }

    #[test]
    fn test_register_duplicate_destination_fails() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&record("a.jpg", "aaa", Some(ts(11)))).unwrap();
        let err = store
            .register(&record("a.jpg", "bbb", Some(ts(12))))
            .unwrap_err();
        assert!(matches!(err, IngestError::Duplicate { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_register_duplicate_content_fails() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&record("a.jpg", "aaa", Some(ts(11)))).unwrap();
        let err = store
            .register(&record("b.jpg", "aaa", Some(ts(11))))
            .unwrap_err();
        assert!(matches!(err, IngestError::Duplicate { .. }));
    }

    #[test]
    fn test_null_capture_times_do_not_trip_unique_constraint() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        // SQL NULL distinctness: two identical-content rows with unset
        // capture times both register. Merging those is the engine's job,
        // through find_by_content.
        store.register(&record("a.txt", "aaa", None)).unwrap();
        store.register(&record("b.txt", "aaa", None)).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_batch_commit_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let store = CatalogStore::open(&path).unwrap();
            store.begin_batch().unwrap();
            store.register(&record("a.jpg", "aaa", Some(ts(11)))).unwrap();
            store.commit_batch().unwrap();
        }
        let store = CatalogStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
