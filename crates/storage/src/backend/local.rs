//! Build output on the local filesystem.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Serves files from a directory that usually holds one sub-directory per
/// project and version, such as `<root>/html/pip/latest/index.html`.
///
/// # Examples
///
/// ```no_run
/// use docsync_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("builds", "/var/lib/docs/builds")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// # Errors
    ///
    /// [`InvalidPath`](ErrorKind::InvalidPath) if `root` is relative, or
    /// exists and is not a directory. A missing root is fine and lists as
    /// empty.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<(PathBuf, PathBuf)> {
        let relative = validate_path(path)?;
        Ok((self.root.join(&relative), relative))
    }

    /// Turn an I/O failure on `path` into the matching storage error.
    fn io_error(err: std::io::Error, path: &Path) -> ErrorKind {
        match err.kind() {
            IoErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            IoErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(err),
        }
    }

    fn file_info(relative: PathBuf, metadata: &Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(relative, metadata.len(), modified))
    }

    /// Resolve every symlink in `absolute` and require the target to stay
    /// below the root.
    async fn contain(&self, absolute: &Path, relative: &Path) -> Result<PathBuf> {
        let root = fs::canonicalize(&self.root).await.map_err(|err| Self::io_error(err, relative))?;
        let target = fs::canonicalize(absolute).await.map_err(|err| Self::io_error(err, relative))?;
        if !target.starts_with(&root) {
            exn::bail!(ErrorKind::InvalidPath(relative.to_path_buf()));
        }
        Ok(target)
    }

    /// Read one directory, returning its files and its sub-directories.
    ///
    /// Symlinks are not followed: they are neither files nor directories of
    /// the build.
    async fn read_dir(&self, dir: &Path) -> Result<(Vec<FileInfo>, Vec<PathBuf>)> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok((files, dirs)),
            Err(err) => exn::bail!(Self::io_error(err, dir)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|err| Self::io_error(err, dir))? {
            let absolute = entry.path();
            let metadata = entry.metadata().await.map_err(|err| Self::io_error(err, &absolute))?;
            if metadata.is_dir() {
                dirs.push(absolute);
            } else if metadata.is_file() {
                let relative = absolute
                    .strip_prefix(&self.root)
                    .or_raise(|| ErrorKind::BackendError(format!("{} is outside the root", absolute.display())))?
                    .to_path_buf();
                files.push(Self::file_info(relative, &metadata)?);
            }
        }
        Ok((files, dirs))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let relative = match prefix.map(validate_path).transpose() {
            Ok(relative) => relative.unwrap_or_default(),
            Err(err) => return Box::pin(futures::stream::once(async { Err(err) })),
        };
        let start = self.root.join(&relative);
        tracing::trace!(backend = %self.name, start = %start.display(), "walking build output");

        Box::pin(stream! {
            match self.contain(&start, &relative).await {
                Ok(_) => {},
                Err(err) if err.is_not_found() => return,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            }
            // A prefix naming a single file lists just that file.
            match fs::metadata(&start).await {
                Ok(metadata) if metadata.is_file() => {
                    yield Self::file_info(relative, &metadata);
                    return;
                },
                Ok(_) => {},
                Err(err) => {
                    yield Err(exn::Exn::from(Self::io_error(err, &relative)));
                    return;
                },
            }
            let mut pending = vec![start];
            while let Some(dir) = pending.pop() {
                match self.read_dir(&dir).await {
                    Ok((files, dirs)) => {
                        pending.extend(dirs);
                        for file in files {
                            yield Ok(file);
                        }
                    },
                    Err(err) => yield Err(err),
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let (absolute, relative) = self.resolve(path)?;
        match self.contain(&absolute, &relative).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let (absolute, relative) = self.resolve(path)?;
        let target = self.contain(&absolute, &relative).await?;
        Ok(fs::read(&target).await.map_err(|err| Self::io_error(err, &relative))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (absolute, relative) = self.resolve(path)?;
        let target = self.contain(&absolute, &relative).await?;
        let metadata = fs::metadata(&target).await.map_err(|err| Self::io_error(err, &relative))?;
        Self::file_info(relative, &metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn build_dir(files: &[&str]) -> (TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, file.as_bytes()).unwrap();
        }
        let backend = LocalBackend::new("builds", dir.path()).unwrap();
        (dir, backend)
    }

    async fn listed(backend: &LocalBackend, prefix: Option<&str>) -> Vec<PathBuf> {
        let mut paths: Vec<_> =
            backend.list(prefix.map(Path::new)).await.unwrap().into_iter().map(|info| info.path).collect();
        paths.sort();
        paths
    }

    const BUILDS: &[&str] = &[
        "html/pip/latest/index.html",
        "html/pip/latest/api/index.html",
        "html/pip/latest/_static/style.css",
        "html/pip/latest2/index.html",
        "html/pip/stable/index.html",
    ];

    #[test]
    fn test_root_must_be_an_absolute_directory() {
        let (dir, _) = build_dir(&["file.txt"]);
        assert!(LocalBackend::new("builds", "relative/root").is_err());
        assert!(LocalBackend::new("builds", dir.path().join("file.txt")).is_err());
        let missing = LocalBackend::new("builds", dir.path().join("not-built-yet")).unwrap();
        assert_eq!(missing.root(), dir.path().join("not-built-yet"));
    }

    #[rstest]
    #[case::everything(None, 5)]
    #[case::version(Some("html/pip/latest"), 3)]
    #[case::component_wise(Some("html/pip/latest2"), 1)]
    #[case::subtree(Some("html/pip/latest/api"), 1)]
    #[case::single_file(Some("html/pip/stable/index.html"), 1)]
    #[case::missing(Some("html/nope/latest"), 0)]
    #[tokio::test]
    async fn test_list(#[case] prefix: Option<&str>, #[case] expected: usize) {
        let (_dir, backend) = build_dir(BUILDS);
        assert_eq!(listed(&backend, prefix).await.len(), expected);
    }

    #[tokio::test]
    async fn test_listed_paths_are_relative_to_root() {
        let (_dir, backend) = build_dir(BUILDS);
        assert_eq!(listed(&backend, Some("html/pip/latest")).await, [
            PathBuf::from("html/pip/latest/_static/style.css"),
            PathBuf::from("html/pip/latest/api/index.html"),
            PathBuf::from("html/pip/latest/index.html"),
        ]);
    }

    #[tokio::test]
    async fn test_missing_root_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("builds", dir.path().join("not-built-yet")).unwrap();
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_exists_and_stat() {
        let (_dir, backend) = build_dir(BUILDS);
        let path = Path::new("html/pip/latest/api/index.html");
        assert!(backend.exists(path).await.unwrap());
        assert_eq!(backend.read(path).await.unwrap(), path.to_str().unwrap().as_bytes());
        let info = backend.stat(path).await.unwrap();
        assert_eq!(info.path, path);
        assert_eq!(info.size, path.as_os_str().len() as u64);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (_dir, backend) = build_dir(BUILDS);
        let path = Path::new("html/pip/latest/objects.inv");
        assert!(!backend.exists(path).await.unwrap());
        let err = backend.read(path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(missing) if missing == path));
        assert!(matches!(&*backend.stat(path).await.unwrap_err(), ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("html/../../etc/passwd")]
    #[tokio::test]
    async fn test_paths_cannot_escape_root(#[case] path: &str) {
        let (_dir, backend) = build_dir(BUILDS);
        let err = backend.read(Path::new(path)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(backend.list(Some(Path::new(path))).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_loop_is_not_walked() {
        let (dir, backend) = build_dir(&["html/pip/latest/index.html"]);
        let version = dir.path().join("html/pip/latest");
        std::os::unix::fs::symlink(&version, version.join("loop")).unwrap();
        assert_eq!(listed(&backend, Some("html/pip/latest")).await, [PathBuf::from("html/pip/latest/index.html")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_cannot_escape_root() {
        let (dir, backend) = build_dir(&["html/pip/latest/index.html"]);
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.html"), "host file").unwrap();
        let version = dir.path().join("html/pip/latest");
        std::os::unix::fs::symlink(outside.path(), version.join("ext")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.html"), version.join("secret.html")).unwrap();

        assert_eq!(listed(&backend, Some("html/pip/latest")).await, [PathBuf::from("html/pip/latest/index.html")]);
        for path in ["html/pip/latest/ext/secret.html", "html/pip/latest/secret.html"] {
            let err = backend.read(Path::new(path)).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::InvalidPath(_)), "{path}");
            assert!(backend.stat(Path::new(path)).await.is_err());
            assert!(backend.exists(Path::new(path)).await.is_err());
        }
        assert!(backend.list(Some(Path::new("html/pip/latest/ext"))).await.is_err());
    }
}
