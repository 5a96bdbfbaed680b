use super::opcode::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The user's verdict on a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Undecided,
    Use,
    Zap,
}

/// What a consumer sees when listing changes.
pub type ChangeStatus = Decision;

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecided => write!(f, "---"),
            Self::Use => write!(f, "use"),
            Self::Zap => write!(f, "zap"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "undecided" | "---" => Ok(Self::Undecided),
            "use" => Ok(Self::Use),
            "zap" => Ok(Self::Zap),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// A mutation requested by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Use,
    Zap,
    Undo,
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Use => write!(f, "use"),
            Self::Zap => write!(f, "zap"),
            Self::Undo => write!(f, "undo"),
        }
    }
}

/// One decidable diff segment of a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    opcode: Opcode,
    decision: Decision,
}

impl Change {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            decision: Decision::Undecided,
        }
    }

    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn status(&self) -> ChangeStatus {
        self.decision
    }

    pub fn is_touched(&self) -> bool {
        self.decision != Decision::Undecided
    }

    /// Include the proposed lines in the merge.
    pub fn use_(&mut self) {
        self.decision = Decision::Use;
    }

    /// Keep the baseline lines.
    pub fn zap(&mut self) {
        self.decision = Decision::Zap;
    }

    pub fn undo(&mut self) {
        self.decision = Decision::Undecided;
    }

    pub fn apply(&mut self, action: DecisionAction) {
        match action {
            DecisionAction::Use => self.use_(),
            DecisionAction::Zap => self.zap(),
            DecisionAction::Undo => self.undo(),
        }
    }
}

/// A persisted `(opcode, touched, decision)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub opcode: Opcode,
    pub touched: bool,
    pub decision: Decision,
}

/// One opcode of a proposal's diff.
///
/// Unchanged spans are structural: they are never listed, never decided and
/// always replayed verbatim when merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Structural(Opcode),
    Decidable(Change),
}

impl Segment {
    pub fn from_opcode(opcode: Opcode) -> Self {
        if opcode.is_equal() {
            Segment::Structural(opcode)
        } else {
            Segment::Decidable(Change::new(opcode))
        }
    }

    pub fn opcode(&self) -> &Opcode {
        match self {
            Segment::Structural(opcode) => opcode,
            Segment::Decidable(change) => change.opcode(),
        }
    }

    pub fn is_null_change(&self) -> bool {
        matches!(self, Segment::Structural(_))
    }

    pub fn is_touched(&self) -> bool {
        match self {
            Segment::Structural(_) => true,
            Segment::Decidable(change) => change.is_touched(),
        }
    }

    pub fn as_change(&self) -> Option<&Change> {
        match self {
            Segment::Structural(_) => None,
            Segment::Decidable(change) => Some(change),
        }
    }

    pub fn as_change_mut(&mut self) -> Option<&mut Change> {
        match self {
            Segment::Structural(_) => None,
            Segment::Decidable(change) => Some(change),
        }
    }

    pub fn entry(&self) -> DecisionEntry {
        match self {
            Segment::Structural(opcode) => DecisionEntry {
                opcode: *opcode,
                touched: true,
                decision: Decision::Undecided,
            },
            Segment::Decidable(change) => DecisionEntry {
                opcode: change.opcode,
                touched: change.is_touched(),
                decision: change.decision,
            },
        }
    }

    /// Copies a saved decision onto this segment.
    ///
    /// Returns `false` without touching anything if the saved opcode differs.
    pub fn restore(&mut self, entry: &DecisionEntry) -> bool {
        if self.opcode() != &entry.opcode {
            return false;
        }
        if let Segment::Decidable(change) = self {
            change.decision = if entry.touched {
                entry.decision
            } else {
                Decision::Undecided
            };
        }
        true
    }
}
