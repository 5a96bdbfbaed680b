use super::view::ChangeView;
use crate::domain::{ChangeStatus, Opcode};
use std::fmt;
use std::path::PathBuf;

/// Stable handle on a change: its proposal and its opcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeId {
    pub proposal: PathBuf,
    pub opcode: Opcode,
}

/// Which changes a query selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeFilter {
    All,
    /// Changes of one artifact.
    Proposal(PathBuf),
    /// Changes against one live file, across all revisions.
    File(PathBuf),
    /// Changes to files anywhere under a directory.
    Dir(PathBuf),
    WhitespaceOnly,
    CvsHeader,
    /// Changes to files nobody edited since the package installed them.
    Unmodified,
    Status(ChangeStatus),
}

impl ChangeFilter {
    pub fn matches(&self, change: &ChangeView<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Proposal(artifact) => change.proposal_path() == artifact,
            Self::File(file) => change.file_path() == file,
            Self::Dir(dir) => change.file_path().starts_with(dir),
            Self::WhitespaceOnly => change.is_whitespace_only(),
            Self::CvsHeader => change.is_cvs_header(),
            Self::Unmodified => change.is_unmodified(),
            Self::Status(status) => change.status() == *status,
        }
    }

    pub(crate) fn needs_unmodified(&self) -> bool {
        matches!(self, Self::Unmodified)
    }
}

impl fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Proposal(p) => write!(f, "proposal {}", p.display()),
            Self::File(p) => write!(f, "file {}", p.display()),
            Self::Dir(p) => write!(f, "dir {}", p.display()),
            Self::WhitespaceOnly => write!(f, "whitespace-only"),
            Self::CvsHeader => write!(f, "cvs-header"),
            Self::Unmodified => write!(f, "unmodified"),
            Self::Status(s) => write!(f, "status {}", s),
        }
    }
}
