//! SQLite persistence for the documentation catalog.
//!
//! The catalog database is derived state: it mirrors what the latest build
//! of each version put into storage, plus the cross-references imported
//! from that build's inventory. Losing it means re-running a sync.
//!
//! # Architecture
//! Two tables back the catalog models:
//! - **catalog_entries**: one row per file of a version's build output,
//!   unique by `(version_id, path)`. Pages carry a rank and content hash,
//!   plain files carry neither.
//! - **domain_objects**: cross-reference targets owned by a page, removed
//!   with it by `ON DELETE CASCADE`.
//!
//! Reads go through [`Repository`]; writes go through a [`UnitOfWork`]
//! obtained from [`Repository::begin`].

mod db;
pub mod error;
mod models;
mod repo;
mod unit;

pub use crate::db::Database;
pub use crate::repo::Repository;
pub use crate::unit::UnitOfWork;
