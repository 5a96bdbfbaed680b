//! SQLite persistence (infrastructure).

pub mod database;
pub mod repository;

pub use database::{Database, GcReport};
pub use repository::{ChecksumRepository, DecisionRepository};
