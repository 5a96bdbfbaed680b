use super::{DbConn, lock, path_key};
use crate::domain::DecisionEntry;
use anyhow::Result;
use rusqlite::OptionalExtension;
use std::path::{Path, PathBuf};

/// Decision lists keyed by proposal artifact path.
pub struct DecisionRepository {
    conn: DbConn,
}

impl DecisionRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    /// Replaces whatever was saved for `artifact`.
    pub fn save(&self, artifact: &Path, entries: &[DecisionEntry]) -> Result<()> {
        let json = serde_json::to_string(entries)?;
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO proposal_decisions (artifact_path, entries_json) VALUES (?1, ?2)",
            rusqlite::params![path_key(artifact), json],
        )?;
        Ok(())
    }

    /// Saved decisions for `artifact`.
    ///
    /// An entry that cannot be decoded is deleted and reported as absent.
    pub fn load(&self, artifact: &Path) -> Result<Option<Vec<DecisionEntry>>> {
        let key = path_key(artifact);
        let conn = lock(&self.conn)?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT entries_json FROM proposal_decisions WHERE artifact_path = ?1",
                [&key],
                |row| Ok(row.get::<_, String>(0).ok()),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let decoded = raw
            .as_deref()
            .map(serde_json::from_str::<Vec<DecisionEntry>>);
        match decoded {
            Some(Ok(entries)) => Ok(Some(entries)),
            Some(Err(err)) => {
                log::warn!("Discarding corrupt decisions for {}: {}", key, err);
                conn.execute("DELETE FROM proposal_decisions WHERE artifact_path = ?1", [&key])?;
                Ok(None)
            }
            None => {
                log::warn!("Discarding unreadable decisions for {}", key);
                conn.execute("DELETE FROM proposal_decisions WHERE artifact_path = ?1", [&key])?;
                Ok(None)
            }
        }
    }

    pub fn delete(&self, artifact: &Path) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let affected = conn.execute(
            "DELETE FROM proposal_decisions WHERE artifact_path = ?1",
            [path_key(artifact)],
        )?;
        Ok(affected > 0)
    }

    pub fn keys(&self) -> Result<Vec<PathBuf>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT artifact_path FROM proposal_decisions ORDER BY artifact_path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in rows.flatten() {
            keys.push(PathBuf::from(key));
        }
        Ok(keys)
    }

    pub fn delete_where_missing(&self, exists: impl Fn(&Path) -> bool) -> Result<usize> {
        super::delete_where_missing(&self.conn, "proposal_decisions", "artifact_path", exists)
    }
}
