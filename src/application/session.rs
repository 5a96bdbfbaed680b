use crate::infra::app_config::AppConfig;
use crate::infra::db::Database;
use crate::infra::file_cache::FileCache;
use crate::infra::oracle::{PackageOracle, PinnedRoots, VdbOracle};
use anyhow::{Context, Result};

/// Everything a registry needs from the outside world, built once per run.
pub struct Session {
    config: AppConfig,
    db: Database,
    cache: FileCache,
    oracle: Box<dyn PackageOracle>,
}

impl Session {
    pub fn new(config: AppConfig, db: Database, oracle: Box<dyn PackageOracle>) -> Self {
        let cache = FileCache::new(config.file_cache_capacity);
        Self {
            config,
            db,
            cache,
            oracle,
        }
    }

    /// Opens the configured store and talks to the real package database.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let db = Database::open(config.state_path.as_deref()).context("open decision store")?;
        let vdb = VdbOracle::new(config.backend, &config.vdb_path);
        let oracle: Box<dyn PackageOracle> = match &config.protected_roots {
            Some(roots) => Box::new(PinnedRoots::new(roots.clone(), vdb)),
            None => Box::new(vdb),
        };
        Ok(Self::new(config, db, oracle))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn oracle(&self) -> &dyn PackageOracle {
        self.oracle.as_ref()
    }

    pub(crate) fn cache_mut(&mut self) -> &mut FileCache {
        &mut self.cache
    }

    pub(crate) fn store_and_cache(&mut self) -> (&Database, &mut FileCache) {
        (&self.db, &mut self.cache)
    }
}
