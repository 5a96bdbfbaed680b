use crate::domain::{Lines, split_lines};
use anyhow::{Context, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CAPACITY: usize = 64;

/// Recency-bounded cache of file contents.
///
/// Entries are never revalidated against the filesystem, so only content that
/// stays put while cached (pending proposals) may go through here.
pub struct FileCache {
    entries: LruCache<PathBuf, Lines>,
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FileCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, path: &Path) -> Result<Lines> {
        if let Some(lines) = self.entries.get(path) {
            return Ok(lines.clone());
        }
        let lines: Lines = Arc::from(read_lines(path)?);
        log::debug!("Cached {} ({} lines)", path.display(), lines.len());
        self.entries.put(path.to_path_buf(), lines.clone());
        Ok(lines)
    }

    pub fn forget(&mut self, path: &Path) {
        self.entries.pop(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads a text file into lines.
///
/// Invalid UTF-8 is replaced rather than rejected; a warning names the file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("{} is not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    Ok(split_lines(&text))
}
