use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// How a span of the baseline relates to the matching span of the proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcodeKind {
    Equal,
    Insert,
    Delete,
    Replace,
}

impl fmt::Display for OpcodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Insert => write!(f, "insert"),
            Self::Delete => write!(f, "delete"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

impl FromStr for OpcodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "insert" => Ok(Self::Insert),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            _ => Err(format!("Invalid opcode kind: {}", s)),
        }
    }
}

/// A classified pair of half-open line ranges.
///
/// The opcodes of one diff partition `[0, baseline.len())` and
/// `[0, proposed.len())` contiguously and in order. Two opcodes are the same
/// change only if every field matches, which is what decision rebinding
/// relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Opcode {
    pub kind: OpcodeKind,
    pub baseline_start: usize,
    pub baseline_end: usize,
    pub proposed_start: usize,
    pub proposed_end: usize,
}

impl Opcode {
    pub fn new(
        kind: OpcodeKind,
        baseline: Range<usize>,
        proposed: Range<usize>,
    ) -> Self {
        Self {
            kind,
            baseline_start: baseline.start,
            baseline_end: baseline.end,
            proposed_start: proposed.start,
            proposed_end: proposed.end,
        }
    }

    pub fn baseline_range(&self) -> Range<usize> {
        self.baseline_start..self.baseline_end
    }

    pub fn proposed_range(&self) -> Range<usize> {
        self.proposed_start..self.proposed_end
    }

    pub fn is_equal(&self) -> bool {
        self.kind == OpcodeKind::Equal
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{},{},{})",
            self.kind, self.baseline_start, self.baseline_end, self.proposed_start, self.proposed_end
        )
    }
}
