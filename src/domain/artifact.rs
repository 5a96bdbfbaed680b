//! Naming contract for update proposals left behind by the package manager.
//!
//! A pending update for `/etc/foo.conf` is installed next to it as
//! `/etc/._cfg0000_foo.conf`; the four digits are the revision.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ARTIFACT_RE: Regex =
        Regex::new(r"^\._cfg([0-9]{4})_(.+)$").expect("artifact name regex");
    static ref LEGACY_STATE_RE: Regex =
        Regex::new(r"^\._cfgstate[0-9]{4}_.*$").expect("legacy state name regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub revision: u32,
    pub original: String,
}

pub fn parse_artifact_name(file_name: &str) -> Option<ArtifactName> {
    let caps = ARTIFACT_RE.captures(file_name)?;
    let revision = caps.get(1)?.as_str().parse().ok()?;
    let original = caps.get(2)?.as_str().to_string();
    Some(ArtifactName { revision, original })
}

pub fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| ARTIFACT_RE.is_match(name))
}

/// Old releases kept decisions in `._cfgstateNNNN_*` files next to the
/// proposals. They are only ever deleted.
pub fn is_legacy_state_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| LEGACY_STATE_RE.is_match(name))
}

/// Resolves the live file an artifact proposes to replace, and its revision.
pub fn target_of(artifact: &Path) -> Option<(PathBuf, u32)> {
    let name = parse_artifact_name(artifact.file_name()?.to_str()?)?;
    let dir = artifact.parent().unwrap_or_else(|| Path::new(""));
    Some((dir.join(name.original), name.revision))
}
