//! Filesystem-atomic replacement of live configuration files.

use crate::domain::join_lines;
use anyhow::{Context, Result, anyhow};
use std::fs::{self, File, FileTimes};
use std::io::Write;
use std::path::Path;

/// Replaces `target` with `lines`, never leaving it missing while unwritten.
///
/// The new content is written and synced to a temporary file next to the
/// target, which takes over mode, ownership and timestamps from the current
/// target (or from `metadata_from` when there is no target yet). The original
/// is then moved over a uniquely named `.<name>.XXXXXX.bak` placeholder, the
/// temporary renamed into place and the backup removed. If the final rename
/// fails the backup is moved back. Only the placeholders are ever overwritten,
/// so a user's own `<name>.bak` is left alone.
pub fn replace_with_backup(
    target: &Path,
    lines: &[String],
    metadata_from: Option<&Path>,
) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", target.display()))?;
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", target.display()))?
        .to_string_lossy();

    let mut merged = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".merged")
        .tempfile_in(dir)
        .with_context(|| format!("create merge file next to {}", target.display()))?;
    merged
        .write_all(join_lines(lines).as_bytes())
        .with_context(|| format!("write merge file for {}", target.display()))?;
    merged
        .as_file()
        .sync_all()
        .with_context(|| format!("sync merge file for {}", target.display()))?;

    let had_original = fs::symlink_metadata(target).is_ok();
    let metadata_source = if had_original { Some(target) } else { metadata_from };
    if let Some(source) = metadata_source {
        copy_metadata(source, merged.as_file());
    }

    if !had_original {
        return merged
            .persist(target)
            .map(drop)
            .map_err(|err| err.error)
            .with_context(|| format!("move merge file onto {}", target.display()));
    }

    let backup = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".bak")
        .tempfile_in(dir)
        .with_context(|| format!("create backup file next to {}", target.display()))?
        .into_temp_path();
    fs::rename(target, &backup).with_context(|| format!("move {} aside", target.display()))?;

    if let Err(err) = merged.persist(target) {
        if let Err(restore) = fs::rename(&backup, target) {
            log::error!(
                "Could not restore {} from {}: {}",
                target.display(),
                backup.display(),
                restore
            );
            if let Err(keep) = backup.keep() {
                log::error!("Could not keep backup of {}: {}", target.display(), keep);
            }
        }
        return Err(err.error).with_context(|| format!("move merge file onto {}", target.display()));
    }

    if let Err(err) = backup.close() {
        log::warn!("Could not remove backup of {}: {}", target.display(), err);
    }
    Ok(())
}

/// Best effort: the merge goes through even if ownership or times can't be kept.
fn copy_metadata(source: &Path, file: &File) {
    let meta = match fs::metadata(source) {
        Ok(meta) => meta,
        Err(err) => {
            log::debug!("No metadata to copy from {}: {}", source.display(), err);
            return;
        }
    };

    // chown clears setuid and setgid, so ownership goes first
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, fchown};
        if let Err(err) = fchown(file, Some(meta.uid()), Some(meta.gid())) {
            log::debug!("Could not copy ownership of {}: {}", source.display(), err);
        }
    }

    if let Err(err) = file.set_permissions(meta.permissions()) {
        log::debug!("Could not copy mode of {}: {}", source.display(), err);
    }

    let mut times = FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Err(err) = file.set_times(times) {
        log::debug!("Could not copy timestamps of {}: {}", source.display(), err);
    }
}
