//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Errors abort a whole pass. Problems with individual files or inventory
//! entries are not errors: they are collected as [`Problem`]s in the pass
//! report and the pass carries on without them.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The build output could not be listed or read; nothing was changed.
    #[display("storage unavailable")]
    StorageUnavailable,
    /// The catalog could not be read or written; nothing was changed.
    #[display("catalog database error")]
    Database,
    #[display("invalid build configuration")]
    Configuration,
    /// The request itself can never succeed, such as a prefix escaping the
    /// storage root.
    #[display("invalid sync request")]
    InvalidRequest,
    /// The inventory is unusable as a whole.
    #[display("invalid inventory")]
    Inventory,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable | Self::Database)
    }
}

/// Something skipped during a pass without failing it.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Problem {
    /// A listed file could not be read, so it was not (re)hashed.
    #[display("cannot read {path}: {reason}")]
    PathRead { path: String, reason: String },
    /// A listed path cannot be expressed as a catalog path.
    #[display("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },
    /// An inventory item was malformed.
    #[display("inventory item {key} rejected: {reason}")]
    InventoryParse { key: String, reason: String },
    /// An inventory entry points at a page that is not in the catalog.
    #[display("{domain}:{role} `{name}` points at unknown page {page_path}")]
    UnresolvedReference { domain: String, role: String, name: String, page_path: String },
}
