//! Infrastructure layer (adapters/implementations).
//!
//! This module contains the IO-heavy parts: SQLite, the filesystem and the
//! package database.

pub mod app_config;
pub mod db;
pub mod diff;
pub mod file_cache;
pub mod fs;
pub mod hash;
pub mod oracle;
pub mod scan;
