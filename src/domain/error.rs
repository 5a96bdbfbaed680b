//! Domain error types for the reconciliation engine.
//!
//! Infrastructure code reports failures through `anyhow`; these variants name
//! the cases a consumer may want to tell apart.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not an update proposal: {0}")]
    InvalidArtifactName(PathBuf),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(PathBuf),

    #[error("Change {opcode} not found in {proposal}")]
    UnknownChange { proposal: PathBuf, opcode: String },

    #[error("Proposal {0} still has undecided changes")]
    Unfinished(PathBuf),

    #[error("Package database query failed: {0}")]
    Oracle(String),
}
