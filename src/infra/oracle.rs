//! Access to the installed-package database.
//!
//! Two questions are asked of it: which directories are configuration
//! protected, and which checksum a package recorded for a file at install
//! time.

use crate::domain::EngineError;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

pub const VDB_PATH: &str = "/var/db/pkg";

lazy_static! {
    static ref PORTAGE_PROTECT_RE: Regex =
        Regex::new(r#"^CONFIG_PROTECT="(.*)"$"#).expect("portage CONFIG_PROTECT regex");
    static ref PKGCORE_PROTECT_RE: Regex =
        Regex::new(r"^'CONFIG_PROTECT' = '(.*)'$").expect("pkgcore CONFIG_PROTECT regex");
}

pub trait PackageOracle {
    /// Directory roots under which update proposals may appear.
    fn protected_roots(&self) -> Result<Vec<PathBuf>>;

    /// Checksums recorded at install time, for those of `paths` that are
    /// still owned by an installed package.
    fn recorded_checksums(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, String>>;
}

/// Which package manager answers the `CONFIG_PROTECT` question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Portage,
    Pkgcore,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portage => write!(f, "portage"),
            Self::Pkgcore => write!(f, "pkgcore"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "portage" => Ok(Self::Portage),
            "pkgcore" => Ok(Self::Pkgcore),
            _ => Err(format!("Invalid backend: {}", s)),
        }
    }
}

impl Backend {
    fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Portage => ("emerge", &["--info"]),
            Self::Pkgcore => ("pconfig", &["dump-uncollapsed"]),
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Self::Portage => &PORTAGE_PROTECT_RE,
            Self::Pkgcore => &PKGCORE_PROTECT_RE,
        }
    }
}

/// Pulls the space-separated `CONFIG_PROTECT` value out of backend output.
pub fn parse_config_protect(backend: Backend, output: &str) -> Option<Vec<PathBuf>> {
    let re = backend.regex();
    output.lines().find_map(|line| {
        re.captures(line.trim()).map(|caps| {
            caps[1]
                .split_whitespace()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        })
    })
}

/// An `obj` line of a package's CONTENTS file: `obj <path> <md5> <mtime>`.
///
/// Paths may contain spaces, so the line is split from the right.
pub fn parse_contents_line(line: &str) -> Option<(PathBuf, String)> {
    let rest = line.strip_prefix("obj ")?;
    let mut parts = rest.rsplitn(3, ' ');
    let _mtime = parts.next()?;
    let md5 = parts.next()?;
    let path = parts.next()?;
    if path.is_empty() || md5.is_empty() {
        return None;
    }
    Some((PathBuf::from(path), md5.to_string()))
}

/// Oracle backed by the live package manager and its VDB.
#[derive(Debug, Clone)]
pub struct VdbOracle {
    backend: Backend,
    vdb_path: PathBuf,
}

impl VdbOracle {
    pub fn new(backend: Backend, vdb_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            vdb_path: vdb_path.into(),
        }
    }

    fn contents_files(&self) -> impl Iterator<Item = PathBuf> {
        ignore::WalkBuilder::new(&self.vdb_path)
            .standard_filters(false)
            .max_depth(Some(3))
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping unreadable VDB entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_name() == "CONTENTS")
            .map(|entry| entry.into_path())
    }
}

impl PackageOracle for VdbOracle {
    fn protected_roots(&self) -> Result<Vec<PathBuf>> {
        let (program, args) = self.backend.command();
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("run {} {}", program, args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Oracle(format!("{} failed: {}", program, stderr.trim())).into());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_config_protect(self.backend, &stdout).ok_or_else(|| {
            EngineError::Oracle(format!("{} did not report CONFIG_PROTECT", program)).into()
        })
    }

    fn recorded_checksums(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, String>> {
        let mut wanted: HashSet<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let mut found = HashMap::new();
        for contents in self.contents_files() {
            if wanted.is_empty() {
                break;
            }
            let text = match std::fs::read_to_string(&contents) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Skipping {}: {}", contents.display(), err);
                    continue;
                }
            };
            for (path, md5) in text.lines().filter_map(parse_contents_line) {
                if wanted.remove(path.as_path()) {
                    found.insert(path, md5);
                }
            }
        }
        Ok(found)
    }
}

/// Fixed answers, for pinned configurations and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    roots: Vec<PathBuf>,
    checksums: HashMap<PathBuf, String>,
}

impl StaticOracle {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            checksums: HashMap::new(),
        }
    }

    pub fn with_checksum(mut self, path: impl Into<PathBuf>, checksum: impl Into<String>) -> Self {
        self.checksums.insert(path.into(), checksum.into());
        self
    }
}

impl PackageOracle for StaticOracle {
    fn protected_roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.roots.clone())
    }

    fn recorded_checksums(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, String>> {
        Ok(paths
            .iter()
            .filter_map(|p| self.checksums.get(p).map(|c| (p.clone(), c.clone())))
            .collect())
    }
}

/// Uses configured roots in place of asking the package manager.
pub struct PinnedRoots<O> {
    roots: Vec<PathBuf>,
    inner: O,
}

impl<O: PackageOracle> PinnedRoots<O> {
    pub fn new(roots: Vec<PathBuf>, inner: O) -> Self {
        Self { roots, inner }
    }
}

impl<O: PackageOracle> PackageOracle for PinnedRoots<O> {
    fn protected_roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.roots.clone())
    }

    fn recorded_checksums(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, String>> {
        self.inner.recorded_checksums(paths)
    }
}
