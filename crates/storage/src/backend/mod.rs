//! Where documentation builds put their output.
//!
//! Backends are read-only from the catalog's point of view: a sync pass
//! enumerates a version prefix and reads the pages it needs to hash.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Read access to build output.
///
/// Paths are relative to the backend root. Implementations run every path
/// they are given through [`validate_path`](crate::validate_path), so a
/// caller can never reach outside the root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use docsync_storage::{backend::StorageBackend, error::Result};
///
/// async fn has_inventory(backend: &dyn StorageBackend, prefix: &Path) -> Result<bool> {
///     backend.exists(&prefix.join("objects.inv")).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, for logs.
    fn name(&self) -> &str;

    /// Every file below `prefix`, or below the root when there is none.
    ///
    /// Collects [`list_stream`](Self::list_stream); the first error aborts
    /// the listing.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream the files below `prefix` as they are found.
    ///
    /// Prefixes match whole path components, so `html/pip/latest` does not
    /// match `html/pip/latest2/index.html`. A prefix that does not exist
    /// streams nothing rather than failing: a build may have produced no
    /// output yet.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// The whole contents of a file.
    ///
    /// Fails with [`NotFound`](crate::error::ErrorKind::NotFound) if there is
    /// no such file.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Metadata of a single file, without reading it.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
