use crate::domain::{
    Change, Decision, DecisionEntry, EngineError, Lines, Opcode, Segment, target_of,
};
use crate::infra::db::Database;
use crate::infra::diff::diff_lines;
use crate::infra::file_cache::FileCache;
use crate::infra::fs::replace_with_backup;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// One `._cfgNNNN_<name>` artifact and, once derived, its diff.
#[derive(Debug)]
pub struct Proposal {
    artifact: PathBuf,
    target: PathBuf,
    revision: u32,
    state: Option<ProposalState>,
}

impl Proposal {
    pub fn new(artifact: PathBuf) -> Result<Self, EngineError> {
        let (target, revision) = target_of(&artifact)
            .ok_or_else(|| EngineError::InvalidArtifactName(artifact.clone()))?;
        Ok(Self {
            artifact,
            target,
            revision,
            state: None,
        })
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// The live file this proposal would replace.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn directory(&self) -> &Path {
        self.target.parent().unwrap_or(Path::new(""))
    }

    /// Directory, then live file, then revision.
    pub(crate) fn sort_key(&self) -> (&Path, &Path, u32) {
        (self.directory(), &self.target, self.revision)
    }

    pub fn is_derived(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&ProposalState> {
        self.state.as_ref()
    }

    pub(crate) fn state_mut(&mut self) -> Option<&mut ProposalState> {
        self.state.as_mut()
    }

    pub(crate) fn set_state(&mut self, state: ProposalState) {
        self.state = Some(state);
    }

    /// Drops the derived diff; the next access rebuilds it from the store.
    pub fn invalidate(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Invalidated {}", self.artifact.display());
        }
    }

    /// Writes `merged` over the live file and retires the artifact.
    ///
    /// Refuses while any change is undecided.
    pub(crate) fn apply(
        &mut self,
        merged: &[String],
        db: &Database,
        cache: &mut FileCache,
    ) -> Result<()> {
        if !self.state.as_ref().is_some_and(ProposalState::is_finished) {
            return Err(EngineError::Unfinished(self.artifact.clone()).into());
        }

        replace_with_backup(&self.target, merged, Some(&self.artifact))
            .with_context(|| format!("write merged {}", self.target.display()))?;

        if let Err(err) = std::fs::remove_file(&self.artifact)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("Could not remove {}: {}", self.artifact.display(), err);
        }
        cache.forget(&self.artifact);
        db.decision_repo().delete(&self.artifact)?;
        self.invalidate();

        log::info!(
            "Applied {} to {}",
            self.artifact.display(),
            self.target.display()
        );
        Ok(())
    }
}

/// Baseline, proposed content and the segments between them.
#[derive(Debug, Clone)]
pub struct ProposalState {
    baseline: Lines,
    proposed: Lines,
    segments: Vec<Segment>,
}

impl ProposalState {
    /// Diffs `baseline` against `proposed` and replays `saved` decisions.
    ///
    /// Saved entries are matched positionally. Restoration stops at the first
    /// entry whose opcode differs, or when the entries run out; later
    /// segments stay undecided.
    pub fn derive(
        baseline: Lines,
        proposed: Lines,
        max_opcodes: usize,
        saved: Option<&[DecisionEntry]>,
    ) -> Self {
        let mut segments: Vec<Segment> = diff_lines(&baseline, &proposed, max_opcodes)
            .into_iter()
            .map(Segment::from_opcode)
            .collect();

        if let Some(saved) = saved {
            let restored = rebind(&mut segments, saved);
            if restored < saved.len() {
                log::debug!(
                    "Restored {} of {} saved decisions; the rest no longer match",
                    restored,
                    saved.len()
                );
            }
        }

        Self {
            baseline,
            proposed,
            segments,
        }
    }

    pub fn baseline(&self) -> &[String] {
        &self.baseline
    }

    pub fn proposed(&self) -> &[String] {
        &self.proposed
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Decidable changes in diff order.
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.segments.iter().filter_map(Segment::as_change)
    }

    pub fn change(&self, opcode: &Opcode) -> Option<&Change> {
        self.changes().find(|c| c.opcode() == opcode)
    }

    pub(crate) fn change_mut(&mut self, opcode: &Opcode) -> Option<&mut Change> {
        self.segments
            .iter_mut()
            .filter_map(Segment::as_change_mut)
            .find(|c| c.opcode() == opcode)
    }

    pub fn baseline_span(&self, opcode: &Opcode) -> &[String] {
        &self.baseline[opcode.baseline_range()]
    }

    pub fn proposed_span(&self, opcode: &Opcode) -> &[String] {
        &self.proposed[opcode.proposed_range()]
    }

    /// The span a segment contributes to the merged file.
    pub fn merged_span(&self, segment: &Segment) -> &[String] {
        match segment {
            Segment::Decidable(change) if change.decision() == Decision::Use => {
                self.proposed_span(change.opcode())
            }
            _ => self.baseline_span(segment.opcode()),
        }
    }

    /// Used changes take the proposed lines; everything else keeps the baseline.
    pub fn merged_content(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| self.merged_span(s).iter().cloned())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.segments.iter().all(Segment::is_touched)
    }

    pub fn entries(&self) -> Vec<DecisionEntry> {
        self.segments.iter().map(Segment::entry).collect()
    }
}

fn rebind(segments: &mut [Segment], saved: &[DecisionEntry]) -> usize {
    let mut restored = 0;
    for (segment, entry) in segments.iter_mut().zip(saved) {
        if !segment.restore(entry) {
            break;
        }
        restored += 1;
    }
    restored
}
