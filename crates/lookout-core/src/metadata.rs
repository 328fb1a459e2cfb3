//! Person records keyed by name, and the store that holds them.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

/// What the operator sees about an enrolled person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub erp_id: String,
    pub branch: String,
    pub gender: String,
}

impl PersonRecord {
    /// Multi-line, human-readable details.
    pub fn details(&self) -> String {
        format!(
            "Person Name: {}\nERP ID: {}\nBranch: {}\nGender: {}",
            self.name, self.erp_id, self.branch, self.gender
        )
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(String),
    #[error("metadata store error: {0}")]
    Backend(String),
}

/// Append-only record store keyed by person name.
///
/// When a name has been appended more than once, `lookup` returns the most
/// recent record.
pub trait MetadataStore: Send + Sync {
    fn append(&self, record: &PersonRecord) -> Result<(), StoreError>;

    fn lookup(&self, name: &str) -> Result<PersonRecord, StoreError>;
}

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PersonRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for MemoryStore {
    fn append(&self, record: &PersonRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<PersonRecord, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        records
            .iter()
            .rev()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
