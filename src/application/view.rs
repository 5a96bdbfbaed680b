//! Read-only presentation wrappers.
//!
//! Views borrow the registry's proposals, so they must be dropped before the
//! next mutation. Consumers re-query after every `decide`, `apply_all` or
//! `refresh`.

use super::filter::ChangeId;
use super::proposal::{Proposal, ProposalState};
use crate::domain::{Change, ChangeStatus, Opcode, OpcodeKind};
use crate::infra::diff::{RenderedLine, is_cvs_header, is_whitespace_only, render_unified};
use std::fmt;
use std::path::Path;

#[derive(Clone, Copy)]
pub struct ChangeView<'a> {
    proposal: &'a Proposal,
    state: &'a ProposalState,
    change: &'a Change,
    unmodified: bool,
}

impl<'a> ChangeView<'a> {
    pub(crate) fn new(
        proposal: &'a Proposal,
        state: &'a ProposalState,
        change: &'a Change,
        unmodified: bool,
    ) -> Self {
        Self {
            proposal,
            state,
            change,
            unmodified,
        }
    }

    pub fn id(&self) -> ChangeId {
        ChangeId {
            proposal: self.proposal.artifact().to_path_buf(),
            opcode: *self.change.opcode(),
        }
    }

    pub fn file_path(&self) -> &'a Path {
        self.proposal.target()
    }

    pub fn proposal_path(&self) -> &'a Path {
        self.proposal.artifact()
    }

    pub fn revision(&self) -> u32 {
        self.proposal.revision()
    }

    pub fn opcode(&self) -> &'a Opcode {
        self.change.opcode()
    }

    pub fn kind(&self) -> OpcodeKind {
        self.change.opcode().kind
    }

    pub fn status(&self) -> ChangeStatus {
        self.change.status()
    }

    pub fn is_touched(&self) -> bool {
        self.change.is_touched()
    }

    pub fn baseline_lines(&self) -> &'a [String] {
        self.state.baseline_span(self.change.opcode())
    }

    pub fn proposed_lines(&self) -> &'a [String] {
        self.state.proposed_span(self.change.opcode())
    }

    pub fn is_whitespace_only(&self) -> bool {
        is_whitespace_only(self.baseline_lines(), self.proposed_lines())
    }

    pub fn is_cvs_header(&self) -> bool {
        is_cvs_header(self.baseline_lines(), self.proposed_lines())
    }

    /// The live file still matches what the package installed or what we last wrote.
    pub fn is_unmodified(&self) -> bool {
        self.unmodified
    }

    /// 1-based, inclusive baseline line numbers.
    pub fn affected_lines(&self) -> (usize, usize) {
        let first = self.opcode().baseline_start + 1;
        let last = self.opcode().baseline_end.max(first);
        (first, last)
    }

    pub fn render(&self) -> Vec<RenderedLine> {
        render_unified(self.baseline_lines(), self.proposed_lines())
    }

    pub fn describe(&self) -> String {
        let (first, last) = self.affected_lines();
        format!(
            "This change proposes to {} content at lines {}-{} of {}",
            self.kind(),
            first,
            last,
            self.file_path().display()
        )
    }
}

impl fmt::Display for ChangeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, last) = self.affected_lines();
        write!(
            f,
            "{}:{}-{}({})",
            self.file_path().display(),
            first,
            last,
            self.revision()
        )
    }
}

#[derive(Clone, Copy)]
pub struct ProposalView<'a> {
    proposal: &'a Proposal,
    state: &'a ProposalState,
    unmodified: bool,
}

impl<'a> ProposalView<'a> {
    pub(crate) fn new(proposal: &'a Proposal, state: &'a ProposalState, unmodified: bool) -> Self {
        Self {
            proposal,
            state,
            unmodified,
        }
    }

    pub fn artifact(&self) -> &'a Path {
        self.proposal.artifact()
    }

    pub fn file_path(&self) -> &'a Path {
        self.proposal.target()
    }

    pub fn revision(&self) -> u32 {
        self.proposal.revision()
    }

    pub fn baseline_content(&self) -> &'a [String] {
        self.state.baseline()
    }

    pub fn proposed_content(&self) -> &'a [String] {
        self.state.proposed()
    }

    pub fn merged_content(&self) -> Vec<String> {
        self.state.merged_content()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn changes(&self) -> Vec<ChangeView<'a>> {
        let (proposal, state, unmodified) = (self.proposal, self.state, self.unmodified);
        state
            .changes()
            .map(|change| ChangeView::new(proposal, state, change, unmodified))
            .collect()
    }
}

impl fmt::Display for ProposalView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_finished() {
            "(finished)"
        } else {
            "(        )"
        };
        write!(
            f,
            "{} {}({})",
            marker,
            self.file_path().display(),
            self.revision()
        )
    }
}
