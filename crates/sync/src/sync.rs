use crate::error::{ErrorKind, Problem, Result};
use crate::{Class, Context};
use docsync_catalog::models::{BuildMarker, CatalogEntry, EntryKind, StoredEntry};
use docsync_catalog::{Keyed, diff};
use docsync_database::Repository;
use docsync_storage::{BackendHandle, to_catalog_path, validate_path};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use tracing::instrument;

/// One build's output for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub version_id: i64,
    /// Where the build output lives in storage, such as `html/pip/latest`.
    pub prefix: PathBuf,
    pub marker: BuildMarker,
    /// Catalog paths that survive even when the build no longer produces
    /// them.
    pub protected: HashSet<String>,
}
impl SyncRequest {
    pub fn new(version_id: i64, prefix: impl Into<PathBuf>, marker: BuildMarker) -> Self {
        Self { version_id, prefix: prefix.into(), marker, protected: HashSet::new() }
    }

    pub fn protect(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protected.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// What a sync pass changed. Every list of paths is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<String>,
    /// Entries that were found again and re-marked with the new build.
    pub touched: Vec<String>,
    pub deleted: Vec<String>,
    /// Entries missing from the build that were kept because they are
    /// protected.
    pub retained: Vec<String>,
    /// Pages that are new, became pages, or whose content hash changed; the
    /// ones a search index needs to pick up again.
    pub changed: Vec<String>,
    pub skipped: Vec<Problem>,
}

/// A file the build produced, and how it will be cataloged.
struct Discovered {
    storage_path: PathBuf,
    class: Class,
}

/// Reconcile one version's catalog with its build output in storage.
///
/// The version is locked for the whole pass. Files are listed and read
/// before anything is written; all writes then happen in one unit of work,
/// so a failure leaves the catalog exactly as it was. Files that cannot be
/// read or mapped to a catalog path are reported in
/// [`SyncReport::skipped`] instead of failing the pass.
///
/// # Errors
///
/// - [`StorageUnavailable`](ErrorKind::StorageUnavailable) if the prefix
///   cannot be listed.
/// - [`Database`](ErrorKind::Database) if the catalog cannot be read or
///   written.
/// - [`InvalidRequest`](ErrorKind::InvalidRequest) if the prefix escapes the
///   storage root. `""`, `.` and `/` all mean the root itself.
#[instrument(
    skip_all,
    fields(
        version_id = request.version_id,
        prefix = %request.prefix.display(),
        build_id = request.marker.build_id,
        backend = backend.name(),
    )
)]
pub async fn sync_version(
    backend: &BackendHandle,
    repository: &Repository,
    ctx: &Context,
    request: &SyncRequest,
) -> Result<SyncReport> {
    let _guard = ctx.locks.acquire(request.version_id).await;
    let mut report = SyncReport::default();

    let prefix = storage_prefix(&request.prefix)?;
    let files = backend.list(prefix.as_deref()).await.or_raise(|| ErrorKind::StorageUnavailable)?;
    tracing::debug!(listed = files.len(), "listed build output");

    let mut discovered = BTreeMap::new();
    for info in files {
        let path = match to_catalog_path(prefix.as_deref().unwrap_or(Path::new("")), &info.path) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(path = %info.path.display(), "skipping unmappable path");
                report.skipped.push(Problem::InvalidPath { path: info.path, reason: (*err).to_string() });
                continue;
            },
        };
        if let Some(class) = ctx.classify(&path) {
            discovered.insert(path, Discovered { storage_path: info.path, class });
        }
    }

    let existing = repository.list_entries(request.version_id).await.or_raise(|| ErrorKind::Database)?;
    let paths: BTreeSet<String> = discovered.keys().cloned().collect();
    let changes = diff(existing, &paths, &request.protected);
    tracing::debug!(
        create = changes.create.len(),
        touch = changes.touch.len(),
        delete = changes.delete.len(),
        retain = changes.retain.len(),
        "computed catalog changes"
    );

    // Pages whose content must be (re)hashed.
    let mut to_read: Vec<&str> = changes
        .create
        .iter()
        .filter(|path| discovered.get(path.as_str()).is_some_and(|file| file.class == Class::Page))
        .map(String::as_str)
        .collect();
    to_read.extend(
        changes
            .touch
            .iter()
            .filter(|stored| {
                discovered.get(stored.path()).is_some_and(|file| file.class == Class::Page)
                    && (ctx.refresh_hashes || stored.kind.content_hash().is_none())
            })
            .map(|stored| stored.path()),
    );
    let (hashes, unreadable) = read_and_hash(backend, ctx.concurrency, &discovered, &to_read).await;
    report.skipped.extend(unreadable);

    let mut uow = repository.begin(request.version_id).await.or_raise(|| ErrorKind::Database)?;

    for path in changes.create {
        let Some(file) = discovered.get(&path) else { continue };
        let kind = match file.class {
            Class::Plain => EntryKind::Plain,
            Class::Page => {
                // Unreadable pages were reported; they are picked up by the
                // next pass that can read them.
                let Some(hash) = hashes.get(&path) else { continue };
                EntryKind::Page { rank: ctx.ranker.rank(&path), content_hash: Some(hash.clone()) }
            },
        };
        let is_page = kind.is_page();
        uow.insert_entry(&CatalogEntry::new(request.version_id, path.clone(), &request.marker, kind))
            .await
            .or_raise(|| ErrorKind::Database)?;
        if is_page {
            report.changed.push(path.clone());
        }
        report.created.push(path);
    }

    for stored in changes.touch {
        let Some(file) = discovered.get(stored.path()) else { continue };
        let was_page = stored.is_page();
        let previous_hash = stored.kind.content_hash().map(str::to_string);
        let kind = match file.class {
            Class::Plain => EntryKind::Plain,
            Class::Page => EntryKind::Page {
                rank: ctx.ranker.rank(stored.path()),
                content_hash: hashes.get(stored.path()).cloned().or_else(|| previous_hash.clone()),
            },
        };
        if was_page && !kind.is_page() {
            let cleared = uow.clear_domain_objects_for_page(stored.id).await.or_raise(|| ErrorKind::Database)?;
            tracing::debug!(path = stored.path(), cleared, "page is no longer indexed");
        }
        let changed = kind.is_page() && (!was_page || kind.content_hash() != previous_hash.as_deref());

        let StoredEntry { id, entry } = stored;
        let entry = CatalogEntry { kind, ..entry }.with_marker(&request.marker);
        let path = entry.path.clone();
        uow.update_entry(&StoredEntry { id, entry }).await.or_raise(|| ErrorKind::Database)?;
        if changed {
            report.changed.push(path.clone());
        }
        report.touched.push(path);
    }

    for stale in changes.delete {
        uow.delete_entry(stale.id).await.or_raise(|| ErrorKind::Database)?;
        report.deleted.push(stale.entry.path);
    }
    report.retained = changes.retain.into_iter().map(|kept| kept.entry.path).collect();

    uow.commit().await.or_raise(|| ErrorKind::Database)?;
    report.changed.sort();

    tracing::info!(
        created = report.created.len(),
        touched = report.touched.len(),
        deleted = report.deleted.len(),
        retained = report.retained.len(),
        changed = report.changed.len(),
        skipped = report.skipped.len(),
        "synced version"
    );
    Ok(report)
}

/// Read and hash `paths`, at most `concurrency` files at a time.
///
/// Returns the hashes that could be computed, keyed by catalog path, and a
/// problem for every file that could not be read.
/// Normalize a request prefix; `None` is the storage root.
pub(crate) fn storage_prefix(prefix: &Path) -> Result<Option<PathBuf>> {
    if prefix.components().all(|component| matches!(component, Component::CurDir | Component::RootDir)) {
        return Ok(None);
    }
    let prefix = validate_path(prefix).or_raise(|| ErrorKind::InvalidRequest)?;
    Ok(Some(prefix))
}

async fn read_and_hash(
    backend: &BackendHandle,
    concurrency: usize,
    discovered: &BTreeMap<String, Discovered>,
    paths: &[&str],
) -> (HashMap<String, String>, Vec<Problem>) {
    let mut pending: VecDeque<_> = paths
        .iter()
        .filter_map(|path| discovered.get(*path).map(|file| (*path, &file.storage_path)))
        .map(|(path, storage_path)| async move {
            let result = backend.read(storage_path).await.map(docsync_catalog::hash);
            (path, result)
        })
        .collect();

    let mut hashes = HashMap::with_capacity(pending.len());
    let mut problems = Vec::new();
    let mut processing = FuturesUnordered::new();
    processing.extend(pending.drain(..concurrency.min(pending.len())));
    while let Some((path, result)) = processing.next().await {
        match result {
            Ok(hash) => {
                hashes.insert(path.to_string(), hash);
            },
            Err(err) => {
                let reason = (*err).to_string();
                tracing::warn!(path, %reason, "cannot read page");
                problems.push(Problem::PathRead { path: path.to_string(), reason });
            },
        }
        // Pop-n-push, FIFO.
        if let Some(next) = pending.pop_front() {
            processing.push(next);
        }
    }
    problems.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    (hashes, problems)
}
