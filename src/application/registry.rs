//! The set of pending proposals and every operation a consumer performs on it.
//!
//! Proposals are sorted by directory, live file and revision. Revisions of the
//! same file are chained: each one diffs against the merged result of the one
//! before it, so deciding a change invalidates every later revision of that
//! file. Aggregate queries are memoized per filter until the next mutation.

use super::filter::{ChangeFilter, ChangeId};
use super::proposal::{Proposal, ProposalState};
use super::session::Session;
use super::view::{ChangeView, ProposalView};
use crate::domain::{
    DecisionAction, EngineError, Lines, Opcode, is_artifact, is_legacy_state_file,
};
use crate::infra::db::GcReport;
use crate::infra::file_cache::read_lines;
use crate::infra::hash::file_checksum;
use crate::infra::scan::collect_files;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of [`Registry::apply_all`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<PathBuf>,
    /// Artifact and the error that stopped it.
    pub failed: Vec<(PathBuf, String)>,
    /// Later revisions of a file whose earlier revision failed.
    pub skipped: Vec<PathBuf>,
    /// Files whose new checksum was recorded as unmodified.
    pub recorded: Vec<PathBuf>,
    pub pruned: GcReport,
}

pub struct Registry {
    session: Session,
    proposals: Vec<Proposal>,
    index: HashMap<PathBuf, usize>,
    previous: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    views: HashMap<ChangeFilter, Vec<ChangeId>>,
    unmodified: Option<HashMap<PathBuf, bool>>,
}

impl Registry {
    /// Creates a registry and scans for proposals.
    pub fn open(session: Session) -> Result<Self> {
        let mut registry = Self {
            session,
            proposals: Vec::new(),
            index: HashMap::new(),
            previous: Vec::new(),
            next: Vec::new(),
            views: HashMap::new(),
            unmodified: None,
        };
        registry.refresh()?;
        Ok(registry)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Rescans the protected roots, dropping all derived state.
    pub fn refresh(&mut self) -> Result<()> {
        let roots = self
            .session
            .oracle()
            .protected_roots()
            .context("resolve protected roots")?;

        let mut proposals: Vec<Proposal> = collect_files(&roots, is_artifact)
            .into_iter()
            .filter_map(|path| match Proposal::new(path) {
                Ok(proposal) => Some(proposal),
                Err(err) => {
                    log::warn!("{}", err);
                    None
                }
            })
            .collect();
        proposals.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        self.proposals = proposals;
        self.link_revisions();
        self.views.clear();
        self.unmodified = None;

        log::info!(
            "Found {} update proposals for {} files",
            self.proposals.len(),
            self.files().len()
        );
        Ok(())
    }

    fn link_revisions(&mut self) {
        let count = self.proposals.len();
        self.index = self
            .proposals
            .iter()
            .enumerate()
            .map(|(i, p)| (p.artifact().to_path_buf(), i))
            .collect();
        self.previous = vec![None; count];
        self.next = vec![None; count];
        for i in 1..count {
            if self.proposals[i - 1].target() == self.proposals[i].target() {
                self.previous[i] = Some(i - 1);
                self.next[i - 1] = Some(i);
            }
        }
    }

    fn index_of(&self, artifact: &Path) -> Result<usize, EngineError> {
        self.index
            .get(artifact)
            .copied()
            .ok_or_else(|| EngineError::UnknownProposal(artifact.to_path_buf()))
    }

    /// Derives the diff of one proposal, and of its earlier revisions first.
    fn ensure_state(&mut self, idx: usize) -> Result<()> {
        if self.proposals[idx].is_derived() {
            return Ok(());
        }

        let baseline: Lines = match self.previous[idx] {
            Some(prev) => {
                self.ensure_state(prev)?;
                let merged = self.proposals[prev]
                    .state()
                    .map(ProposalState::merged_content)
                    .unwrap_or_default();
                Arc::from(merged)
            }
            None => Arc::from(read_live(self.proposals[idx].target())?),
        };

        let artifact = self.proposals[idx].artifact().to_path_buf();
        let proposed = self.session.cache_mut().get(&artifact)?;
        let saved = self.session.db().decision_repo().load(&artifact)?;
        let state = ProposalState::derive(
            baseline,
            proposed,
            self.session.config().max_opcodes,
            saved.as_deref(),
        );
        self.proposals[idx].set_state(state);
        Ok(())
    }

    fn ensure_all(&mut self) -> Result<()> {
        for idx in 0..self.proposals.len() {
            self.ensure_state(idx)?;
        }
        Ok(())
    }

    /// Computes which live files are unmodified, once per refresh.
    fn ensure_unmodified(&mut self) -> Result<()> {
        if self.unmodified.is_some() {
            return Ok(());
        }

        let files = self.files();
        let recorded = match self.session.oracle().recorded_checksums(&files) {
            Ok(recorded) => recorded,
            Err(err) => {
                log::warn!("Could not read package checksums: {:#}", err);
                HashMap::new()
            }
        };

        let checksums = self.session.db().checksum_repo();
        let mut unmodified = HashMap::with_capacity(files.len());
        for file in files {
            let live = match file_checksum(&file) {
                Ok(live) => live,
                Err(err) => {
                    log::warn!("Could not checksum {}: {}", file.display(), err);
                    None
                }
            };
            let matches = match live {
                Some(live) => {
                    recorded.get(&file) == Some(&live)
                        || checksums.get(&file)?.as_deref() == Some(live.as_str())
                }
                None => false,
            };
            unmodified.insert(file, matches);
        }
        self.unmodified = Some(unmodified);
        Ok(())
    }

    fn is_unmodified(&self, file: &Path) -> bool {
        self.unmodified
            .as_ref()
            .and_then(|m| m.get(file))
            .copied()
            .unwrap_or(false)
    }

    /// Live files with at least one pending proposal, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.proposals
            .iter()
            .map(|p| p.target().to_path_buf())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn proposals(&mut self) -> Result<Vec<ProposalView<'_>>> {
        self.ensure_all()?;
        self.ensure_unmodified()?;
        let this = &*self;
        Ok(this
            .proposals
            .iter()
            .filter_map(|p| this.proposal_view(p))
            .collect())
    }

    /// Proposals of one live file, lowest revision first.
    pub fn file_proposals(&mut self, file: &Path) -> Result<Vec<ProposalView<'_>>> {
        Ok(self
            .proposals()?
            .into_iter()
            .filter(|p| p.file_path() == file)
            .collect())
    }

    pub fn proposal(&mut self, artifact: &Path) -> Result<ProposalView<'_>> {
        let idx = self.index_of(artifact)?;
        self.ensure_state(idx)?;
        self.ensure_unmodified()?;
        let this = &*self;
        this.proposal_view(&this.proposals[idx])
            .ok_or_else(|| EngineError::UnknownProposal(artifact.to_path_buf()).into())
    }

    fn proposal_view<'a>(&'a self, proposal: &'a Proposal) -> Option<ProposalView<'a>> {
        let state = proposal.state()?;
        Some(ProposalView::new(
            proposal,
            state,
            self.is_unmodified(proposal.target()),
        ))
    }

    /// The revision this proposal diffs against, if any.
    pub fn previous_revision_of(&self, artifact: &Path) -> Option<&Proposal> {
        let idx = self.index.get(artifact)?;
        self.previous[*idx].map(|prev| &self.proposals[prev])
    }

    pub fn is_finished(&mut self, artifact: &Path) -> Result<bool> {
        let idx = self.index_of(artifact)?;
        self.ensure_state(idx)?;
        Ok(self.proposals[idx]
            .state()
            .is_some_and(ProposalState::is_finished))
    }

    fn all_changes(&self) -> impl Iterator<Item = ChangeView<'_>> {
        self.proposals.iter().flat_map(move |proposal| {
            let unmodified = self.is_unmodified(proposal.target());
            proposal.state().into_iter().flat_map(move |state| {
                state
                    .changes()
                    .map(move |change| ChangeView::new(proposal, state, change, unmodified))
            })
        })
    }

    /// Ids of the changes matching `filter`, in registry order.
    pub fn change_ids(&mut self, filter: &ChangeFilter) -> Result<Vec<ChangeId>> {
        if let Some(ids) = self.views.get(filter) {
            return Ok(ids.clone());
        }

        self.ensure_all()?;
        if filter.needs_unmodified() {
            self.ensure_unmodified()?;
        }
        let ids: Vec<ChangeId> = self
            .all_changes()
            .filter(|change| filter.matches(change))
            .map(|change| change.id())
            .collect();
        log::debug!("{} changes match {}", ids.len(), filter);
        self.views.insert(filter.clone(), ids.clone());
        Ok(ids)
    }

    pub fn changes(&mut self, filter: &ChangeFilter) -> Result<Vec<ChangeView<'_>>> {
        let ids = self.change_ids(filter)?;
        self.ensure_unmodified()?;
        let this = &*self;
        Ok(ids.iter().filter_map(|id| this.view_of(id)).collect())
    }

    pub fn change(&mut self, id: &ChangeId) -> Result<ChangeView<'_>> {
        let idx = self.index_of(&id.proposal)?;
        self.ensure_state(idx)?;
        self.ensure_unmodified()?;
        let this = &*self;
        this.view_of(id).ok_or_else(|| {
            EngineError::UnknownChange {
                proposal: id.proposal.clone(),
                opcode: id.opcode.to_string(),
            }
            .into()
        })
    }

    fn view_of(&self, id: &ChangeId) -> Option<ChangeView<'_>> {
        let proposal = &self.proposals[*self.index.get(&id.proposal)?];
        let state = proposal.state()?;
        let change = state.change(&id.opcode)?;
        Some(ChangeView::new(
            proposal,
            state,
            change,
            self.is_unmodified(proposal.target()),
        ))
    }

    /// Applies `action` to every change in `ids`. Returns how many were found.
    ///
    /// Ids of a revision invalidated earlier in the same call may no longer
    /// exist; those are skipped.
    pub fn decide(&mut self, ids: &[ChangeId], action: DecisionAction) -> Result<usize> {
        let mut decided = 0;
        for id in ids {
            let Some(&idx) = self.index.get(&id.proposal) else {
                log::debug!("Skipping change of unknown proposal {}", id.proposal.display());
                continue;
            };
            self.ensure_state(idx)?;
            let Some(change) = self.proposals[idx]
                .state_mut()
                .and_then(|state| state.change_mut(&id.opcode))
            else {
                log::debug!("Skipping stale change {} of {}", id.opcode, id.proposal.display());
                continue;
            };
            change.apply(action);
            decided += 1;
            self.on_proposal_changed(idx)?;
        }
        Ok(decided)
    }

    /// Applies `action` to every undecided change matching all `filters`.
    ///
    /// Proposals are visited lowest revision first and each is re-derived
    /// before it is matched, so a later revision is selected against the
    /// merge its earlier revisions now produce.
    pub fn decide_matching(
        &mut self,
        filters: &[ChangeFilter],
        action: DecisionAction,
    ) -> Result<usize> {
        if filters.iter().any(ChangeFilter::needs_unmodified) {
            self.ensure_unmodified()?;
        }

        let mut decided = 0;
        for idx in 0..self.proposals.len() {
            self.ensure_state(idx)?;
            let opcodes = self.undecided_matching(idx, filters);
            if opcodes.is_empty() {
                continue;
            }
            if let Some(state) = self.proposals[idx].state_mut() {
                for opcode in &opcodes {
                    if let Some(change) = state.change_mut(opcode) {
                        change.apply(action);
                        decided += 1;
                    }
                }
            }
            self.on_proposal_changed(idx)?;
        }
        Ok(decided)
    }

    fn undecided_matching(&self, idx: usize, filters: &[ChangeFilter]) -> Vec<Opcode> {
        let proposal = &self.proposals[idx];
        let Some(state) = proposal.state() else {
            return Vec::new();
        };
        let unmodified = self.is_unmodified(proposal.target());
        state
            .changes()
            .filter(|change| !change.is_touched())
            .map(|change| ChangeView::new(proposal, state, change, unmodified))
            .filter(|view| filters.iter().all(|filter| filter.matches(view)))
            .map(|view| *view.opcode())
            .collect()
    }

    /// Persists a proposal's decisions and drops everything derived from them.
    fn on_proposal_changed(&mut self, idx: usize) -> Result<()> {
        let proposal = &self.proposals[idx];
        if let Some(state) = proposal.state() {
            self.session
                .db()
                .decision_repo()
                .save(proposal.artifact(), &state.entries())?;
        }
        self.views.clear();

        let mut cursor = self.next[idx];
        while let Some(later) = cursor {
            self.proposals[later].invalidate();
            cursor = self.next[later];
        }
        Ok(())
    }

    /// Writes every finished proposal, then rescans.
    ///
    /// Merged contents are computed before anything is written. A failure
    /// skips the later revisions of the same file and the rest continue.
    pub fn apply_all(&mut self) -> Result<ApplyReport> {
        self.ensure_all()?;
        let plan: Vec<(usize, Vec<String>)> = self
            .proposals
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                p.state()
                    .filter(|s| s.is_finished())
                    .map(|s| (idx, s.merged_content()))
            })
            .collect();

        let mut report = ApplyReport::default();
        let mut failed_files: HashSet<PathBuf> = HashSet::new();
        for (idx, merged) in &plan {
            let proposal = &mut self.proposals[*idx];
            let artifact = proposal.artifact().to_path_buf();
            if failed_files.contains(proposal.target()) {
                log::warn!("Skipping {} after an earlier failure", artifact.display());
                report.skipped.push(artifact);
                continue;
            }
            let (db, cache) = self.session.store_and_cache();
            match proposal.apply(merged, db, cache) {
                Ok(()) => report.applied.push(artifact),
                Err(err) => {
                    log::error!("Failed to apply {}: {:#}", artifact.display(), err);
                    failed_files.insert(proposal.target().to_path_buf());
                    report.failed.push((artifact, format!("{:#}", err)));
                }
            }
        }

        let applied: HashSet<&Path> = report.applied.iter().map(PathBuf::as_path).collect();
        let resolved: Vec<PathBuf> = self
            .files()
            .into_iter()
            .filter(|file| {
                self.proposals
                    .iter()
                    .filter(|p| p.target() == file)
                    .all(|p| applied.contains(p.artifact()))
            })
            .collect();
        report.recorded = self.record_checksums(&resolved)?;

        report.pruned = self
            .session
            .db()
            .garbage_collect(|p| p.exists(), |p| p.exists())?;
        self.refresh()?;

        log::info!(
            "Applied {} proposals, {} failed",
            report.applied.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Remembers the checksum of freshly written files the package database knows.
    fn record_checksums(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let known = match self.session.oracle().recorded_checksums(files) {
            Ok(known) => known,
            Err(err) => {
                log::warn!("Could not read package checksums: {:#}", err);
                return Ok(Vec::new());
            }
        };

        let repo = self.session.db().checksum_repo();
        let mut recorded = Vec::new();
        for file in files {
            if !known.contains_key(file) {
                if repo.clear(file)? {
                    log::debug!("Cleared stale checksum of {}", file.display());
                }
                continue;
            }
            if let Some(checksum) = file_checksum(file)
                .with_context(|| format!("checksum {}", file.display()))?
            {
                repo.record(file, &checksum)?;
                recorded.push(file.clone());
            }
        }
        Ok(recorded)
    }

    /// Forgets every decision, including legacy state files, and rescans.
    pub fn reset_decisions(&mut self) -> Result<usize> {
        let repo = self.session.db().decision_repo();
        let mut cleared = 0;
        for proposal in &self.proposals {
            if repo.delete(proposal.artifact())? {
                cleared += 1;
            }
        }

        let roots = self
            .session
            .oracle()
            .protected_roots()
            .context("resolve protected roots")?;
        for legacy in collect_files(&roots, is_legacy_state_file) {
            match std::fs::remove_file(&legacy) {
                Ok(()) => log::info!("Removed legacy state file {}", legacy.display()),
                Err(err) => log::warn!("Could not remove {}: {}", legacy.display(), err),
            }
        }

        self.refresh()?;
        Ok(cleared)
    }
}

/// Live file content; a file that does not exist yet is empty.
fn read_live(target: &Path) -> Result<Vec<String>> {
    if !target.exists() {
        log::debug!("{} does not exist, diffing against nothing", target.display());
        return Ok(Vec::new());
    }
    read_lines(target)
}
