//! SQLite store for change decisions and checksum records.
//! Handles database location, schema creation and migrations.

use anyhow::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::repository::{ChecksumRepository, DecisionRepository};

const DEFAULT_DB_PATH: &str = "/var/lib/etc-proposals/state.sqlite";

/// Database wrapper that manages the SQLite connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// What a garbage collection pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub decisions: usize,
    pub checksums: usize,
}

impl Database {
    /// Open the database at `path`, or at the default location
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::open_at(path.to_path_buf()),
            None => Self::open_at(Self::default_path()),
        }
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        Ok(db)
    }

    /// Create or open the database at a specific path
    pub fn open_at(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init()?;
        log::debug!("Opened decision store at {}", path.display());
        Ok(db)
    }

    fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("ETC_PROPOSALS_DB_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_DB_PATH)
    }

    /// Initialize database schema
    fn init(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("decision store lock poisoned"))?;
        const SCHEMA_VERSION: i32 = 1;

        let existing_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if existing_version == 0 {
            Self::create_schema(&conn)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if existing_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported decision store version {} (expected {})",
                existing_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Get a reference to the connection
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn decision_repo(&self) -> DecisionRepository {
        DecisionRepository::new(self.connection())
    }

    pub fn checksum_repo(&self) -> ChecksumRepository {
        ChecksumRepository::new(self.connection())
    }

    /// Drops decisions of vanished proposals and records of vanished files.
    pub fn garbage_collect(
        &self,
        artifact_exists: impl Fn(&Path) -> bool,
        file_exists: impl Fn(&Path) -> bool,
    ) -> Result<GcReport> {
        let report = GcReport {
            decisions: self.decision_repo().delete_where_missing(artifact_exists)?,
            checksums: self.checksum_repo().delete_where_missing(file_exists)?,
        };
        if report != GcReport::default() {
            log::info!(
                "Pruned {} decision lists and {} checksum records",
                report.decisions,
                report.checksums
            );
        }
        Ok(report)
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS proposal_decisions (
                artifact_path TEXT PRIMARY KEY,
                entries_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS unmodified_checksums (
                file_path TEXT PRIMARY KEY,
                checksum TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}
