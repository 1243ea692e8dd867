//! Filesystem snapshot store with atomic replacement.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::paths::{self, snapshot_path, CURRENT_DIR, OWNERSHIP_FILE, SUMMARY_FILE};
use super::{SnapshotKey, SnapshotStore, Slot, StoreError, WriteOutcome};
use crate::models::EntityKind;
use crate::period::Period;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores documents under `<root>` (the `stats` directory).
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &SnapshotKey) -> PathBuf {
        snapshot_path(&self.root, key)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir)(e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err(dir))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    Ok(dirs)
}

impl SnapshotStore for FsSnapshotStore {
    fn write_bytes(&self, key: &SnapshotKey, bytes: &[u8]) -> Result<WriteOutcome, StoreError> {
        let path = self.path_of(key);
        match std::fs::read(&path) {
            Ok(existing) if existing == bytes => return Ok(WriteOutcome::Unchanged),
            _ => {}
        }

        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;

        let tmp = dir.join(format!(
            ".{}.tmp-{}-{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path)(e));
        }
        debug!("Wrote {}", path.display());
        Ok(WriteOutcome::Written)
    }

    fn read_bytes(&self, key: &SnapshotKey) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<SnapshotKey>, StoreError> {
        let mut keys = Vec::new();
        for (escaped, entity_dir) in subdirs(&self.root.join(kind.dir_name()))? {
            let Some(id) = paths::unescape_id(&escaped) else {
                continue;
            };
            for (label, slot_dir) in subdirs(&entity_dir)? {
                if label == CURRENT_DIR {
                    if slot_dir.join(OWNERSHIP_FILE).is_file() {
                        keys.push(SnapshotKey {
                            kind,
                            id: id.clone(),
                            slot: Slot::Current,
                        });
                    }
                    continue;
                }
                let Some(period) = Period::from_label(&label) else {
                    continue;
                };
                if slot_dir.join(SUMMARY_FILE).is_file() {
                    keys.push(SnapshotKey::aggregate(kind, id.clone(), period));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Removes the document and its slot directory once empty. The entity
    /// directory stays so concurrent writers never lose their parent.
    fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        let path = self.path_of(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_err(&path)(e)),
        }
        if let Some(dir) = path.parent() {
            // Left in place when not empty.
            let _ = std::fs::remove_dir(dir);
        }
        debug!("Removed {}", path.display());
        Ok(true)
    }
}
