//! Application layer (use-cases, policies).
//!
//! Orchestrates domain logic over the stores and the filesystem: proposal
//! derivation, revision chaining, queries and apply.

pub mod filter;
pub mod proposal;
pub mod registry;
pub mod session;
pub mod view;

pub use filter::{ChangeFilter, ChangeId};
pub use proposal::{Proposal, ProposalState};
pub use registry::{ApplyReport, Registry};
pub use session::Session;
pub use view::{ChangeView, ProposalView};
