//! SQLite-backed template store.
//!
//! One row per enrolled identity, keyed by username. The embedding is
//! stored as JSON; writes are upserts, so re-enrollment is last-write-wins.
//! Each statement runs inside SQLite's own transaction, which gives readers
//! the whole-record atomicity the store contract requires.

use facegate_core::{Embedding, IdentityRecord, StoreError, TemplateStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("failed to open template database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory {0}")]
    CreateDir(String, #[source] std::io::Error),
}

/// Durable template store. A single connection guarded by a mutex is
/// sufficient here: enrollment and verification are serialized by the
/// engine thread anyway, and SQLite handles crash consistency.
pub struct SqliteTemplateStore {
    conn: Mutex<Connection>,
}

impl SqliteTemplateStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OpenError::CreateDir(parent.display().to_string(), e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                username       TEXT PRIMARY KEY,
                account_number TEXT NOT NULL,
                pin            TEXT NOT NULL,
                embedding      TEXT NOT NULL,
                created_at     TEXT NOT NULL
            );",
        )?;

        tracing::info!(path = %path.display(), "template database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used in tests.
    pub fn open_in_memory() -> Result<Self, OpenError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                username       TEXT PRIMARY KEY,
                account_number TEXT NOT NULL,
                pin            TEXT NOT NULL,
                embedding      TEXT NOT NULL,
                created_at     TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl TemplateStore for SqliteTemplateStore {
    fn get(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| backend_err("connection lock poisoned"))?;

        let row = conn
            .query_row(
                "SELECT account_number, pin, embedding, created_at
                 FROM identities WHERE username = ?1",
                params![username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(backend_err)?;

        let Some((account_number, pin, embedding_json, created_at)) = row else {
            return Ok(None);
        };

        let values: Vec<f32> = serde_json::from_str(&embedding_json).map_err(backend_err)?;
        Ok(Some(IdentityRecord {
            username: username.to_string(),
            account_number,
            pin,
            embedding: Embedding::new(values),
            created_at,
        }))
    }

    fn put(&self, record: IdentityRecord) -> Result<(), StoreError> {
        let embedding_json =
            serde_json::to_string(&record.embedding.values).map_err(backend_err)?;

        let conn = self.conn.lock().map_err(|_| backend_err("connection lock poisoned"))?;
        conn.execute(
            "INSERT INTO identities (username, account_number, pin, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(username) DO UPDATE SET
                 account_number = excluded.account_number,
                 pin            = excluded.pin,
                 embedding      = excluded.embedding,
                 created_at     = excluded.created_at",
            params![
                record.username,
                record.account_number,
                record.pin,
                embedding_json,
                record.created_at,
            ],
        )
        .map_err(backend_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(username: &str, first_value: f32) -> IdentityRecord {
        IdentityRecord {
            username: username.into(),
            account_number: "40-1234".into(),
            pin: "4821".into(),
            embedding: Embedding::new(vec![first_value, -0.25, 0.125]),
            created_at: "2026-08-23T10:00:00Z".into(),
        }
    }

    #[test]
    fn get_missing_returns_none() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn put_then_get_roundtrips_exactly() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        store.put(record("alice", 0.5)).unwrap();

        let found = store.get("alice").unwrap().unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.account_number, "40-1234");
        assert_eq!(found.pin, "4821");
        assert_eq!(found.embedding.values, vec![0.5, -0.25, 0.125]);
        assert_eq!(found.created_at, "2026-08-23T10:00:00Z");
    }

    #[test]
    fn upsert_overwrites_existing_record() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        store.put(record("alice", 0.5)).unwrap();
        store.put(record("alice", 0.75)).unwrap();

        let found = store.get("alice").unwrap().unwrap();
        assert_eq!(found.embedding.values[0], 0.75, "last write wins");
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identities.db");

        {
            let store = SqliteTemplateStore::open(&path).unwrap();
            store.put(record("alice", 0.5)).unwrap();
        }

        let store = SqliteTemplateStore::open(&path).unwrap();
        let found = store.get("alice").unwrap().unwrap();
        assert_eq!(found.embedding.values.len(), 3);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data/identities.db");
        let store = SqliteTemplateStore::open(&path).unwrap();
        store.put(record("alice", 0.5)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn usernames_are_distinct_keys() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        store.put(record("alice", 0.1)).unwrap();
        store.put(record("bob", 0.9)).unwrap();

        assert_eq!(store.get("alice").unwrap().unwrap().embedding.values[0], 0.1);
        assert_eq!(store.get("bob").unwrap().unwrap().embedding.values[0], 0.9);
    }
}
