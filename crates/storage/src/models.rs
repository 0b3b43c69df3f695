use std::path::PathBuf;
use time::UtcDateTime;

/// One file of build output, as listed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative to the backend root, including the version prefix.
    pub path: PathBuf,
    pub size: u64,
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<UtcDateTime>) -> Self {
        Self { path: path.into(), size, modified: modified.into() }
    }
}
