//! Storage paths and catalog paths.
//!
//! A storage path is relative to the backend root and must never leave it.
//! A catalog path is relative to a version prefix and always `/`-separated,
//! so ranking globs and inventory uris compare against the same string on
//! every platform.

use crate::error::{ErrorKind, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Normalize a storage path, rejecting anything that escapes the root.
///
/// `.` segments, repeated and trailing separators, and a leading `/` are
/// dropped; `..` is resolved as long as it stays inside the root. Empty
/// paths, platform prefixes and NUL bytes are rejected with
/// [`InvalidPath`](ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use docsync_storage::validate_path;
///
/// assert_eq!(validate_path("html/./pip//latest/").unwrap(), Path::new("html/pip/latest"));
/// assert_eq!(validate_path("html/stale/../pip").unwrap(), Path::new("html/pip"));
/// assert!(validate_path("html/../../etc/passwd").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut segments: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) if segment.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(segment) => segments.push(segment),
            Component::ParentDir => {
                segments.pop().ok_or_else(invalid)?;
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
        }
    }
    if segments.is_empty() {
        exn::bail!(invalid());
    }
    Ok(segments.iter().collect())
}

/// Express a storage path as a catalog path below `prefix`.
///
/// An empty prefix means the whole storage path is the catalog path.
///
/// # Errors
///
/// [`InvalidPath`](ErrorKind::InvalidPath) if `path` is not strictly below
/// `prefix` (whole components only), or is not valid UTF-8.
///
/// # Examples
///
/// ```
/// use docsync_storage::to_catalog_path;
///
/// assert_eq!(to_catalog_path("html/pip/latest", "html/pip/latest/api/index.html").unwrap(), "api/index.html");
/// assert!(to_catalog_path("html/pip/latest", "html/pip/stable/index.html").is_err());
/// ```
pub fn to_catalog_path(prefix: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<String> {
    let path = validate(path)?;
    let prefix = prefix.as_ref();
    let relative = match prefix.components().next() {
        None => path.as_path(),
        Some(_) => path
            .strip_prefix(validate(prefix)?)
            .map_err(|_| ErrorKind::InvalidPath(path.clone()))?,
    };
    let segments = relative
        .iter()
        .map(|segment| segment.to_str().ok_or_else(|| ErrorKind::InvalidPath(path.clone())))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if segments.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.clone()));
    }
    Ok(segments.join("/"))
}
