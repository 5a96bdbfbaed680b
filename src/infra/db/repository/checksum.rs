use super::{DbConn, lock, path_key};
use anyhow::Result;
use rusqlite::OptionalExtension;
use std::path::Path;

/// Checksums of files as last written by an apply.
pub struct ChecksumRepository {
    conn: DbConn,
}

impl ChecksumRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn record(&self, file: &Path, checksum: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO unmodified_checksums (file_path, checksum) VALUES (?1, ?2)",
            rusqlite::params![path_key(file), checksum],
        )?;
        Ok(())
    }

    pub fn get(&self, file: &Path) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        let checksum = conn
            .query_row(
                "SELECT checksum FROM unmodified_checksums WHERE file_path = ?1",
                [path_key(file)],
                |row| Ok(row.get::<_, String>(0).ok()),
            )
            .optional()?;
        Ok(checksum.flatten())
    }

    pub fn clear(&self, file: &Path) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let affected = conn.execute(
            "DELETE FROM unmodified_checksums WHERE file_path = ?1",
            [path_key(file)],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_where_missing(&self, exists: impl Fn(&Path) -> bool) -> Result<usize> {
        super::delete_where_missing(&self.conn, "unmodified_checksums", "file_path", exists)
    }
}
