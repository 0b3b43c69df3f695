//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A glob pattern could not be compiled.
    #[display("invalid glob pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// The inventory as a whole is unusable (individual bad entries are
    /// reported as [`Rejection`](crate::Rejection)s instead).
    #[display("invalid inventory: {_0}")]
    InvalidInventory(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Patterns and inventories are either valid or they're not.
        false
    }
}
