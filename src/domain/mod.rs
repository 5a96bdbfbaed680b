//! Domain types for etc-proposals.
//! Opcodes, changes and their decisions, and the artifact naming contract.

pub mod artifact;
pub mod change;
pub mod content;
pub mod error;
pub mod opcode;

pub use artifact::*;
pub use change::*;
pub use content::*;
pub use error::*;
pub use opcode::*;
