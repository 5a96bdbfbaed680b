//! Walks configuration-protected directories for proposal artifacts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable path: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
}

fn absolute(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
}

/// All files under `roots` accepted by `matches`, deduplicated and sorted.
///
/// Missing roots and unreadable directories are logged and skipped.
pub fn collect_files(roots: &[PathBuf], matches: impl Fn(&Path) -> bool) -> BTreeSet<PathBuf> {
    let mut found = BTreeSet::new();
    for root in roots {
        let root = absolute(root);
        if !root.exists() {
            log::warn!("Protected root {} does not exist", root.display());
            continue;
        }
        found.extend(walk_files(&root).filter(|p| matches(p)));
    }
    found
}
