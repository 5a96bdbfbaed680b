use crate::infra::oracle::{Backend, VDB_PATH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MAX_OPCODES: usize = 200;
pub const DEFAULT_FILE_CACHE_CAPACITY: usize = crate::infra::file_cache::DEFAULT_CAPACITY;
const CONFIG_FILENAME: &str = "etc-proposals.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Package manager asked for `CONFIG_PROTECT`.
    pub backend: Backend,
    /// Scan these roots instead of asking the package manager.
    pub protected_roots: Option<Vec<PathBuf>>,
    /// Decision store location; `None` picks the default.
    pub state_path: Option<PathBuf>,
    pub vdb_path: PathBuf,
    /// Diffs with more opcodes than this become a single change. 0 disables.
    pub max_opcodes: usize,
    pub file_cache_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            protected_roots: None,
            state_path: None,
            vdb_path: PathBuf::from(VDB_PATH),
            max_opcodes: DEFAULT_MAX_OPCODES,
            file_cache_capacity: DEFAULT_FILE_CACHE_CAPACITY,
        }
    }
}

pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

pub fn load_config_from(path: &std::path::Path) -> AppConfig {
    let Ok(contents) = std::fs::read_to_string(path) else {
        log::debug!("No config at {}, using defaults", path.display());
        return AppConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Ignoring invalid config {}: {}", path.display(), err);
            AppConfig::default()
        }
    }
}

pub fn save_config(config: &AppConfig, path: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config).unwrap_or_default();
    std::fs::write(path, contents)
}

/// First existing of `$ETC_PROPOSALS_CONFIG`, `./etc-proposals.toml`,
/// the user config dir and `/etc/etc-proposals.toml`.
fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ETC_PROPOSALS_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILENAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("etc-proposals").join("config.toml"));
    }
    candidates.push(PathBuf::from("/etc").join(CONFIG_FILENAME));
    candidates.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            backend = "pkgcore"
            protected_roots = ["/etc", "/usr/share/config"]
            max_opcodes = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Pkgcore);
        assert_eq!(config.protected_roots.as_ref().unwrap().len(), 2);
        assert_eq!(config.max_opcodes, 10);
        assert_eq!(config.file_cache_capacity, DEFAULT_FILE_CACHE_CAPACITY);
        assert_eq!(config.vdb_path, PathBuf::from(VDB_PATH));
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_opcodes = \"lots\"").unwrap();
        let config = load_config_from(&path);
        assert_eq!(config.max_opcodes, DEFAULT_MAX_OPCODES);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig {
            state_path: Some(dir.path().join("state.sqlite")),
            max_opcodes: 0,
            ..AppConfig::default()
        };
        save_config(&config, &path).unwrap();
        let loaded = load_config_from(&path);
        assert_eq!(loaded.state_path, config.state_path);
        assert_eq!(loaded.max_opcodes, 0);
    }
}
