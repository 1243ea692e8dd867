//! Snapshot path utilities.

use std::path::{Path, PathBuf};

use super::{SnapshotKey, Slot};

pub const SUMMARY_FILE: &str = "summary.json";
pub const OWNERSHIP_FILE: &str = "ownership.json";
pub const CURRENT_DIR: &str = "current";

/// Make an entity id safe as a single path component.
///
/// Bytes outside `[A-Za-z0-9_-]` and `.` are percent-encoded, and so is a
/// leading `.` so ids can never be `.` or `..` or hidden.
pub fn escape_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for (i, b) in id.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    out
}

/// Inverse of [`escape_id`]. Returns `None` for malformed input.
pub fn unescape_id(escaped: &str) -> Option<String> {
    if escaped == "%00" {
        return Some(String::new());
    }
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Location of a document under the `stats` root.
pub fn snapshot_path(root: &Path, key: &SnapshotKey) -> PathBuf {
    let dir = root.join(key.kind.dir_name()).join(escape_id(&key.id));
    match key.slot {
        Slot::Period(period) => dir.join(period.label()).join(SUMMARY_FILE),
        Slot::Current => dir.join(CURRENT_DIR).join(OWNERSHIP_FILE),
    }
}
