//! Repository discovery under `repos_root`.

use ignore::WalkBuilder;
use std::path::Path;
use tracing::debug;

use super::RepoSpec;

/// Find every directory under `root` that contains a `.git` entry.
///
/// Repositories are named by their `/`-separated path relative to `root`
/// (`owner/repo` or `repo`) and returned sorted by name. Nested repositories
/// are reported too.
pub fn discover_repositories(root: &Path) -> Vec<RepoSpec> {
    if !root.is_dir() {
        return Vec::new();
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut found: Vec<RepoSpec> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_dir()))
        .filter(|e| e.path().join(".git").exists())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let name = if name.is_empty() {
                root.file_name()?.to_string_lossy().into_owned()
            } else {
                name
            };
            Some(RepoSpec {
                name,
                path: e.path().to_path_buf(),
            })
        })
        .collect();

    found.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Discovered {} repositories under {}", found.len(), root.display());
    found
}
