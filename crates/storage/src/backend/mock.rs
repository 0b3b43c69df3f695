//! In-memory build output for tests.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, validate_path};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

struct MockFile {
    data: Vec<u8>,
    modified: UtcDateTime,
    /// Listed, but every read fails.
    broken: bool,
}
impl MockFile {
    fn info(&self, path: &Path) -> FileInfo {
        FileInfo::new(path, self.data.len() as u64, self.modified)
    }
}

/// Build output held in memory.
///
/// Tests change the "build" between passes with [`put`](Self::put) and
/// [`remove`](Self::remove), and simulate failures with
/// [`break_file`](Self::break_file) and
/// [`set_available`](Self::set_available). Listings come back sorted by path.
///
/// # Examples
///
/// ```
/// use docsync_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("html/pip/latest/index.html", "<html></html>")]);
/// backend.put("html/pip/latest/api/index.html", "<html>api</html>").await;
/// assert_eq!(backend.list(Some(Path::new("html/pip/latest"))).await?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    files: RwLock<BTreeMap<PathBuf, MockFile>>,
    available: AtomicBool,
}

impl MockBackend {
    /// Panics on a path that would not pass validation: the test itself is
    /// wrong.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let files = files
            .into_iter()
            .map(|(path, data)| (Self::checked(path.into()), MockFile { data: data.into(), modified: now, broken: false }))
            .collect();
        Self {
            name: "mock".to_string(),
            files: RwLock::new(files),
            available: AtomicBool::new(true),
        }
    }

    /// Create or replace a file. Replacing a broken file repairs it.
    pub async fn put(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let file = MockFile { data: data.into(), modified: UtcDateTime::now(), broken: false };
        self.files.write().await.insert(Self::checked(path.into()), file);
    }

    /// Returns whether the file existed.
    pub async fn remove(&self, path: impl Into<PathBuf>) -> bool {
        self.files.write().await.remove(&Self::checked(path.into())).is_some()
    }

    /// Keep listing the file, but fail every read of it with an I/O error.
    pub async fn break_file(&self, path: impl Into<PathBuf>) {
        if let Some(file) = self.files.write().await.get_mut(&Self::checked(path.into())) {
            file.broken = true;
        }
    }

    /// While unavailable, every listing fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn checked(path: PathBuf) -> PathBuf {
        match validate_path(&path) {
            Ok(path) => path,
            Err(_) => panic!("MockBackend: invalid path {}", path.display()),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(Vec::<(PathBuf, Vec<u8>)>::new())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        futures::stream::once(async move {
            if !self.available.load(Ordering::SeqCst) {
                exn::bail!(ErrorKind::BackendError(format!("backend `{}` is unavailable", self.name)));
            }
            let prefix = prefix.map(validate_path).transpose()?;
            let files = self.files.read().await;
            let listed: Vec<Result<FileInfo>> = files
                .iter()
                .filter(|(path, _)| prefix.as_ref().is_none_or(|prefix| path.starts_with(prefix)))
                .map(|(path, file)| Ok(file.info(path)))
                .collect();
            Ok::<_, crate::error::Error>(futures::stream::iter(listed))
        })
        .try_flatten()
        .boxed()
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.files.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let files = self.files.read().await;
        match files.get(&path) {
            None => exn::bail!(ErrorKind::NotFound(path)),
            Some(file) if file.broken => {
                let err = std::io::Error::other(format!("simulated read failure: {}", path.display()));
                exn::bail!(ErrorKind::Io(err))
            },
            Some(file) => Ok(file.data.clone()),
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let files = self.files.read().await;
        match files.get(&path) {
            Some(file) => Ok(file.info(&path)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> MockBackend {
        MockBackend::with_files([
            ("html/pip/latest/index.html", "index"),
            ("html/pip/latest/api/index.html", "api"),
            ("html/pip/latest2/index.html", "other"),
        ])
    }

    #[tokio::test]
    async fn test_listing_is_sorted_and_component_wise() {
        let backend = site();
        let paths: Vec<_> = backend
            .list(Some(Path::new("html/pip/latest")))
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.path)
            .collect();
        assert_eq!(paths, [PathBuf::from("html/pip/latest/api/index.html"), PathBuf::from("html/pip/latest/index.html")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_put_replaces_and_remove() {
        let backend = site();
        backend.put("html/pip/latest/index.html", "changed").await;
        assert_eq!(backend.read(Path::new("html/pip/latest/index.html")).await.unwrap(), b"changed");
        assert_eq!(backend.stat(Path::new("html/pip/latest/index.html")).await.unwrap().size, 7);
        assert!(backend.remove("html/pip/latest/index.html").await);
        assert!(!backend.remove("html/pip/latest/index.html").await);
        let err = backend.read(Path::new("html/pip/latest/index.html")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_broken_file_is_listed_but_unreadable() {
        let backend = site();
        backend.break_file("html/pip/latest/index.html").await;
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        let err = backend.read(Path::new("html/pip/latest/index.html")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(_)));
        backend.put("html/pip/latest/index.html", "fixed").await;
        assert!(backend.read(Path::new("html/pip/latest/index.html")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_listing() {
        let backend = site();
        backend.set_available(false);
        let err = backend.list(None).await.unwrap_err();
        assert!(err.is_retryable());
        backend.set_available(true);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_paths_are_validated() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.list(Some(Path::new(".."))).await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", "bad")]);
    }
}
