//! Repository implementations for the decision store.
//!
//! Two namespaces: per-proposal decision lists and per-file checksum records.

mod checksum;
mod decision;

pub use checksum::ChecksumRepository;
pub use decision::DecisionRepository;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub(super) type DbConn = Arc<Mutex<Connection>>;

pub(super) fn lock(conn: &DbConn) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow::anyhow!("decision store lock poisoned"))
}

pub(super) fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Deletes every row of `table` whose key is unreadable or names a path
/// `exists` rejects. Returns the number of rows removed.
pub(super) fn delete_where_missing(
    conn: &DbConn,
    table: &str,
    key_column: &str,
    exists: impl Fn(&Path) -> bool,
) -> Result<usize> {
    let conn = lock(conn)?;
    let doomed: Vec<i64> = {
        let mut stmt = conn.prepare(&format!("SELECT rowid, {key_column} FROM {table}"))?;
        let rows = stmt.query_map([], |row| {
            let rowid: i64 = row.get(0)?;
            let key: Option<String> = row.get::<_, String>(1).ok();
            Ok((rowid, key))
        })?;
        let mut doomed = Vec::new();
        for row in rows {
            let (rowid, key) = row?;
            match key {
                Some(key) if exists(Path::new(&key)) => {}
                Some(key) => {
                    log::debug!("Pruning {} entry for {}", table, key);
                    doomed.push(rowid);
                }
                None => {
                    log::warn!("Discarding unreadable {} key (rowid {})", table, rowid);
                    doomed.push(rowid);
                }
            }
        }
        doomed
    };

    let mut stmt = conn.prepare(&format!("DELETE FROM {table} WHERE rowid = ?1"))?;
    for rowid in &doomed {
        stmt.execute([rowid])?;
    }
    Ok(doomed.len())
}
