//! Snapshot store
//!
//! Aggregates and ownership records are persisted whole, one document per
//! key. Writing the same record twice yields the same bytes; a write whose
//! bytes match what is stored is reported as unchanged. Documents a run no
//! longer produces are deleted by the pipeline, not overwritten.
//!
//! Layout of the filesystem store:
//!
//! ```text
//! stats/
//!   developers/<id>/<YYYY-MM-DD_YYYY-MM-DD>/summary.json
//!   teams/<id>/<label>/summary.json
//!   subsystems/<id>/<label>/summary.json
//!   subsystems/<id>/current/ownership.json
//! ```

mod fs;
mod memory;
pub mod paths;

pub use fs::FsSnapshotStore;
pub use memory::MemorySnapshotStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::aggregate::{AggregateKey, AggregateRecord};
use crate::models::EntityKind;
use crate::ownership::OwnershipRecord;
use crate::period::Period;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no snapshot for {0}")]
    NotFound(SnapshotKey),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {key} is not valid JSON: {source}")]
    Corrupt {
        key: SnapshotKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize {key}: {source}")]
    Serialize {
        key: SnapshotKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Which document of an entity a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    /// `summary.json` of a month or year
    Period(Period),
    /// `current/ownership.json`
    Current,
}

/// Address of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotKey {
    pub kind: EntityKind,
    pub id: String,
    pub slot: Slot,
}

impl SnapshotKey {
    pub fn aggregate(kind: EntityKind, id: impl Into<String>, period: Period) -> Self {
        Self {
            kind,
            id: id.into(),
            slot: Slot::Period(period),
        }
    }

    pub fn ownership(subsystem: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Subsystem,
            id: subsystem.into(),
            slot: Slot::Current,
        }
    }

    pub fn period(&self) -> Option<Period> {
        match self.slot {
            Slot::Period(p) => Some(p),
            Slot::Current => None,
        }
    }
}

impl From<&AggregateKey> for SnapshotKey {
    fn from(key: &AggregateKey) -> Self {
        SnapshotKey::aggregate(key.kind, key.id.clone(), key.period)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Slot::Period(p) => write!(f, "{} '{}' {}", self.kind, self.id, p.label()),
            Slot::Current => write!(f, "{} '{}' current ownership", self.kind, self.id),
        }
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Persistence of whole documents by key.
pub trait SnapshotStore: Send + Sync {
    /// Replace the document at `key`.
    fn write_bytes(&self, key: &SnapshotKey, bytes: &[u8]) -> Result<WriteOutcome, StoreError>;

    /// The stored document, or [`StoreError::NotFound`].
    fn read_bytes(&self, key: &SnapshotKey) -> Result<Vec<u8>, StoreError>;

    /// Every stored key of `kind`, sorted.
    fn list(&self, kind: EntityKind) -> Result<Vec<SnapshotKey>, StoreError>;

    /// Remove the document at `key`. Returns false when there was none.
    fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError>;
}

/// Canonical document bytes: pretty JSON with a trailing newline.
pub fn encode<T: Serialize>(key: &SnapshotKey, value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
        key: key.clone(),
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(key: &SnapshotKey, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        key: key.clone(),
        source,
    })
}

/// Typed access on top of any [`SnapshotStore`].
pub trait SnapshotStoreExt: SnapshotStore {
    fn write_aggregate(&self, record: &AggregateRecord) -> Result<WriteOutcome, StoreError> {
        let key = SnapshotKey::from(&record.key());
        self.write_bytes(&key, &encode(&key, record)?)
    }

    fn read_aggregate(
        &self,
        kind: EntityKind,
        id: &str,
        period: Period,
    ) -> Result<AggregateRecord, StoreError> {
        let key = SnapshotKey::aggregate(kind, id, period);
        decode(&key, &self.read_bytes(&key)?)
    }

    fn write_ownership(&self, record: &OwnershipRecord) -> Result<WriteOutcome, StoreError> {
        let key = SnapshotKey::ownership(record.subsystem.clone());
        self.write_bytes(&key, &encode(&key, record)?)
    }

    fn read_ownership(&self, subsystem: &str) -> Result<OwnershipRecord, StoreError> {
        let key = SnapshotKey::ownership(subsystem);
        decode(&key, &self.read_bytes(&key)?)
    }

    /// Stored aggregate records of `kind` whose period satisfies `filter`.
    fn load_aggregates(
        &self,
        kind: EntityKind,
        filter: &dyn Fn(&Period) -> bool,
    ) -> Result<Vec<AggregateRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.list(kind)? {
            let Some(period) = key.period() else {
                continue;
            };
            if filter(&period) {
                records.push(decode(&key, &self.read_bytes(&key)?)?);
            }
        }
        Ok(records)
    }

    /// Every stored ownership record, keyed by subsystem.
    fn load_ownership(
        &self,
    ) -> Result<std::collections::BTreeMap<String, OwnershipRecord>, StoreError> {
        let mut all = std::collections::BTreeMap::new();
        for key in self.list(EntityKind::Subsystem)? {
            if key.slot == Slot::Current {
                let record: OwnershipRecord = decode(&key, &self.read_bytes(&key)?)?;
                all.insert(key.id.clone(), record);
            }
        }
        Ok(all)
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Month;

    /// Both stores must behave identically.
    fn exercise(store: &dyn SnapshotStore) {
        let period = Period::Month(Month::new(2025, 3).unwrap());
        let key = AggregateKey::new(EntityKind::Subsystem, "billing/api", period);
        let mut record = AggregateRecord::empty(&key);
        record.commits = 3;

        assert!(matches!(
            store.read_aggregate(EntityKind::Subsystem, "billing/api", period),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.write_aggregate(&record).unwrap(), WriteOutcome::Written);
        assert_eq!(store.write_aggregate(&record).unwrap(), WriteOutcome::Unchanged);
        let back = store
            .read_aggregate(EntityKind::Subsystem, "billing/api", period)
            .unwrap();
        assert_eq!(back, record);

        record.commits = 4;
        assert_eq!(store.write_aggregate(&record).unwrap(), WriteOutcome::Written);

        let year = AggregateRecord::empty(&AggregateKey::new(EntityKind::Subsystem, "billing/api", Period::Year(2025)));
        store.write_aggregate(&year).unwrap();
        let ownership = OwnershipRecord {
            subsystem: "billing/api".into(),
            as_of: Default::default(),
            total_lines: 0,
            ignored_lines: 0,
            developers: Default::default(),
            per_repo: Default::default(),
            top_owner: None,
        };
        store.write_ownership(&ownership).unwrap();

        let keys = store.list(EntityKind::Subsystem).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(store.list(EntityKind::Team).unwrap().is_empty());

        let yearly = store
            .load_aggregates(EntityKind::Subsystem, &|p| p.is_yearly())
            .unwrap();
        assert_eq!(yearly.len(), 1);
        assert_eq!(store.load_ownership().unwrap().len(), 1);
        assert_eq!(store.read_ownership("billing/api").unwrap(), ownership);

        let month_key = SnapshotKey::aggregate(EntityKind::Subsystem, "billing/api", period);
        assert!(store.delete(&month_key).unwrap());
        assert!(!store.delete(&month_key).unwrap());
        assert!(matches!(
            store.read_aggregate(EntityKind::Subsystem, "billing/api", period),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list(EntityKind::Subsystem).unwrap().len(), 2);
        assert_eq!(store.write_aggregate(&record).unwrap(), WriteOutcome::Written);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySnapshotStore::new());
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsSnapshotStore::new(dir.path()));
    }
}
