//! In-memory snapshot store for dry runs and tests.

use dashmap::DashMap;

use super::{SnapshotKey, SnapshotStore, StoreError, WriteOutcome};
use crate::models::EntityKind;

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    documents: DashMap<SnapshotKey, Vec<u8>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write_bytes(&self, key: &SnapshotKey, bytes: &[u8]) -> Result<WriteOutcome, StoreError> {
        let mut unchanged = false;
        self.documents
            .entry(key.clone())
            .and_modify(|existing| {
                unchanged = existing.as_slice() == bytes;
                if !unchanged {
                    *existing = bytes.to_vec();
                }
            })
            .or_insert_with(|| bytes.to_vec());
        Ok(if unchanged {
            WriteOutcome::Unchanged
        } else {
            WriteOutcome::Written
        })
    }

    fn read_bytes(&self, key: &SnapshotKey) -> Result<Vec<u8>, StoreError> {
        self.documents
            .get(key)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<SnapshotKey>, StoreError> {
        let mut keys: Vec<SnapshotKey> = self
            .documents
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        Ok(self.documents.remove(key).is_some())
    }
}
