//! Database Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use exn::ResultExt;

/// A database error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored value could not be converted to or from its model.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A write would break a catalog invariant (duplicate path, domain object
    /// without a page, entry from another version).
    #[display("catalog constraint violated: {_0}")]
    Constraint(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY and friends surface as `Database`.
        matches!(self, Self::Database)
    }

    fn from_write(err: &sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db) if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() => {
                Self::Constraint(db.message().to_string())
            },
            _ => Self::Database,
        }
    }
}

/// Raise failed writes as [`Constraint`](ErrorKind::Constraint) when the
/// database rejected them for breaking a constraint, [`Database`](ErrorKind::Database)
/// otherwise.
pub(crate) trait WriteResultExt<T> {
    fn or_raise_write(self) -> Result<T>;
}
impl<T> WriteResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn or_raise_write(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from_write(&err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}
