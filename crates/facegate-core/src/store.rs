//! Template store abstraction.
//!
//! The pipeline only ever needs `get`/`put` keyed by username; the backend
//! is injected so flows are testable in memory and swappable for a durable
//! store without touching pipeline logic.

use crate::types::IdentityRecord;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("template store backend: {0}")]
    Backend(String),
}

/// Keyed storage for enrolled identities.
///
/// `put` must be atomic from a concurrent reader's perspective: a `get`
/// for the same key observes either the prior record or the complete new
/// one, never a partial write.
pub trait TemplateStore: Send {
    fn get(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError>;

    /// Insert or replace the record for `record.username`. Re-enrollment
    /// overwrites: last write wins, no merge, no versioning.
    fn put(&self, record: IdentityRecord) -> Result<(), StoreError>;
}

impl<S: TemplateStore + Sync> TemplateStore for std::sync::Arc<S> {
    fn get(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError> {
        (**self).get(username)
    }

    fn put(&self, record: IdentityRecord) -> Result<(), StoreError> {
        (**self).put(record)
    }
}

/// In-memory store for tests and ephemeral deployments. Records do not
/// survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    records: RwLock<HashMap<String, IdentityRecord>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn get(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Backend("template store lock poisoned".into()))?;
        Ok(records.get(username).cloned())
    }

    fn put(&self, record: IdentityRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Backend("template store lock poisoned".into()))?;
        records.insert(record.username.clone(), record);
        Ok(())
    }
}
