use crate::Context;
use crate::sync::storage_prefix;
use crate::error::{ErrorKind, Problem, Result};
use docsync_catalog::Inventory;
use docsync_catalog::models::{BuildMarker, DomainObject};
use docsync_database::Repository;
use docsync_storage::BackendHandle;
use exn::ResultExt;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Inventory file a build leaves at the root of its output.
pub const OBJECTS_INV: &str = "objects.inv";

/// What an inventory import did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Domain objects now attached to the version's pages.
    pub imported: usize,
    /// Domain objects of the previous import that were replaced.
    pub cleared: u64,
    pub unresolved: Vec<Problem>,
    /// Items the inventory parser could not make sense of.
    pub rejected: Vec<Problem>,
}

/// Replace every domain object of `version_id` with those in `inventory`.
///
/// Each entry is attached to the page its uri points at. Entries pointing at
/// pages the catalog does not know are reported as unresolved and skipped.
/// When several entries share an identity on the same page, the last one
/// wins.
#[instrument(skip_all, fields(version_id = version_id, build_id = marker.build_id, entries = inventory.len()))]
pub async fn import_inventory(
    repository: &Repository,
    ctx: &Context,
    version_id: i64,
    marker: &BuildMarker,
    inventory: &Inventory,
) -> Result<ImportReport> {
    let _guard = ctx.locks.acquire(version_id).await;
    let mut report = ImportReport {
        rejected: inventory
            .rejections
            .iter()
            .map(|rejection| Problem::InventoryParse { key: rejection.key.clone(), reason: rejection.reason.clone() })
            .collect(),
        ..ImportReport::default()
    };

    let mut uow = repository.begin(version_id).await.or_raise(|| ErrorKind::Database)?;
    let pages: HashMap<String, i64> = uow
        .list_pages()
        .await
        .or_raise(|| ErrorKind::Database)?
        .into_iter()
        .map(|page| (page.entry.path, page.id))
        .collect();

    let mut objects = BTreeMap::new();
    for entry in &inventory.entries {
        let target = entry.target();
        let Some(&page_id) = pages.get(&target.page_path) else {
            tracing::debug!(name = %entry.name, page = %target.page_path, "unresolved inventory entry");
            report.unresolved.push(Problem::UnresolvedReference {
                domain: entry.domain.clone(),
                role: entry.role.clone(),
                name: entry.name.clone(),
                page_path: target.page_path,
            });
            continue;
        };
        let identity = (page_id, entry.domain.clone(), entry.role.clone(), entry.name.clone());
        objects.insert(identity, DomainObject {
            page_id,
            domain: entry.domain.clone(),
            object_type: entry.role.clone(),
            canonical_name: entry.name.clone(),
            anchor: target.anchor,
            display_name: entry.display_name().to_string(),
            commit: marker.commit.clone(),
            build_id: marker.build_id,
        });
    }

    report.cleared = uow.clear_domain_objects().await.or_raise(|| ErrorKind::Database)?;
    for object in objects.values() {
        uow.insert_domain_object(object).await.or_raise(|| ErrorKind::Database)?;
    }
    uow.commit().await.or_raise(|| ErrorKind::Database)?;
    report.imported = objects.len();

    if !report.unresolved.is_empty() {
        tracing::warn!(unresolved = report.unresolved.len(), "inventory entries point at unknown pages");
    }
    tracing::info!(
        imported = report.imported,
        cleared = report.cleared,
        rejected = report.rejected.len(),
        "imported inventory"
    );
    Ok(report)
}

/// Import the `objects.inv` a build left under `prefix`.
///
/// Returns `None` without touching the catalog when the build produced no
/// inventory.
pub async fn import_inventory_from_storage(
    backend: &BackendHandle,
    repository: &Repository,
    ctx: &Context,
    version_id: i64,
    prefix: impl AsRef<Path>,
    marker: &BuildMarker,
) -> Result<Option<ImportReport>> {
    let path = match storage_prefix(prefix.as_ref())? {
        Some(prefix) => prefix.join(OBJECTS_INV),
        None => PathBuf::from(OBJECTS_INV),
    };
    let bytes = match backend.read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.is_not_found() => {
            tracing::debug!(path = %path.display(), "build has no inventory");
            return Ok(None);
        },
        Err(err) => return Err(err.raise(ErrorKind::StorageUnavailable)),
    };
    let inventory = Inventory::from_objects_inv(&bytes).or_raise(|| ErrorKind::Inventory)?;
    import_inventory(repository, ctx, version_id, marker, &inventory).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SyncRequest, sync_version};
    use docsync_config::BuildConfig;
    use docsync_database::Database;
    use docsync_storage::backend::MockBackend;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;
    use std::sync::Arc;

    const PREFIX: &str = "html/pip/latest";
    const VERSION: i64 = 1;

    const THREE_GROUPS: &str = r#"{
        "cpp:function": {"sphinx.test.function": ["dummy-proj-1", "dummy-version-1", "test.html#epub-faq", "dummy-func-name-1"]},
        "py:function": {"sample.test.function": ["dummy-proj-2", "dummy-version-2", "test.html#sample-test-func", "dummy-func-name-2"]},
        "js:function": {"testFunction": ["dummy-proj-3", "dummy-version-3", "api/#test-func", "dummy-func-name-3"]}
    }"#;

    struct Fixture {
        storage: Arc<MockBackend>,
        backend: BackendHandle,
        repository: Repository,
        ctx: Context,
    }

    async fn synced() -> Fixture {
        let storage = Arc::new(MockBackend::with_files([
            (format!("{PREFIX}/index.html"), "<html>index</html>"),
            (format!("{PREFIX}/test.html"), "<html>test</html>"),
            (format!("{PREFIX}/api/index.html"), "<html>api</html>"),
        ]));
        let backend: BackendHandle = storage.clone();
        let db = Database::connect_in_memory().await.unwrap();
        let repository = Repository::from(&db);
        let ctx = Context::new(&BuildConfig::default()).unwrap();
        let request = SyncRequest::new(VERSION, PREFIX, marker(1));
        sync_version(&backend, &repository, &ctx, &request).await.unwrap();
        Fixture { storage, backend, repository, ctx }
    }

    fn marker(build_id: i64) -> BuildMarker {
        BuildMarker::new(format!("commit{build_id:02}"), build_id)
    }

    fn objects_inv(body: &str) -> Vec<u8> {
        let mut bytes = b"# Sphinx inventory version 2\n# Project: pip\n# Version: 24.0\n# The remainder of this file is compressed using zlib.\n".to_vec();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        bytes.extend(encoder.finish().unwrap());
        bytes
    }

    async fn page_id(repository: &Repository, path: &str) -> i64 {
        repository.get_page(VERSION, path).await.unwrap().unwrap().id
    }

    #[tokio::test]
    async fn test_import_three_groups() {
        let f = synced().await;
        let inventory = Inventory::from_json(THREE_GROUPS).unwrap();
        let report = import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(report.cleared, 0);
        assert!(report.unresolved.is_empty() && report.rejected.is_empty());
        assert_eq!(f.repository.count_domain_objects(VERSION).await.unwrap(), 3);

        let api = page_id(&f.repository, "api/index.html").await;
        let objects = f.repository.list_domain_objects_for_page(api).await.unwrap();
        assert_eq!(objects.len(), 1);
        let js = &objects[0];
        assert_eq!(js.role_key(), "js:function");
        assert_eq!(js.canonical_name, "testFunction");
        assert_eq!(js.anchor, "test-func");
        assert_eq!(js.display_name, "dummy-func-name-3");
        assert_eq!((js.commit.as_str(), js.build_id), ("commit01", 1));

        let test = page_id(&f.repository, "test.html").await;
        assert_eq!(f.repository.list_domain_objects_for_page(test).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reimport_replaces_everything() {
        let f = synced().await;
        let first = Inventory::from_json(THREE_GROUPS).unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &first).await.unwrap();

        let second = Inventory::from_json(r#"{"py:class": {"pip.Renamed": ["pip", "24.0", "index.html#renamed", "-"]}}"#)
            .unwrap();
        let report = import_inventory(&f.repository, &f.ctx, VERSION, &marker(2), &second).await.unwrap();
        assert_eq!(report.cleared, 3);
        assert_eq!(report.imported, 1);

        let objects = f.repository.list_domain_objects(VERSION).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].canonical_name, "pip.Renamed");
        assert_eq!(objects[0].display_name, "pip.Renamed", "`-` displays the object name");
        assert_eq!(objects[0].build_id, 2);
    }

    #[tokio::test]
    async fn test_same_inventory_twice_has_no_duplicates() {
        let f = synced().await;
        let inventory = Inventory::from_json(THREE_GROUPS).unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        assert_eq!(f.repository.count_domain_objects(VERSION).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unresolved_and_rejected_are_reported() {
        let f = synced().await;
        let inventory = Inventory::from_json(
            r#"{
                "py:function": {
                    "pip.main": ["pip", "24.0", "index.html#pip.main", "main"],
                    "pip.gone": ["pip", "24.0", "removed.html#pip.gone", "gone"],
                    "pip.short": ["pip", "24.0"]
                }
            }"#,
        )
        .unwrap();
        let report = import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.unresolved, [Problem::UnresolvedReference {
            domain: "py".to_string(),
            role: "function".to_string(),
            name: "pip.gone".to_string(),
            page_path: "removed.html".to_string(),
        }]);
        assert!(matches!(report.rejected.as_slice(), [Problem::InventoryParse { key, .. }] if key == "py:function/pip.short"));
    }

    #[tokio::test]
    async fn test_duplicate_identity_keeps_last() {
        let f = synced().await;
        let body = "pip.main py:function 1 index.html#first First\npip.main py:function 1 index.html#second Second\n";
        let inventory = Inventory::from_objects_inv(&objects_inv(body)).unwrap();
        let report = import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        assert_eq!(report.imported, 1);
        let objects = f.repository.list_domain_objects(VERSION).await.unwrap();
        assert_eq!((objects[0].anchor.as_str(), objects[0].display_name.as_str()), ("second", "Second"));
    }

    #[tokio::test]
    async fn test_deleted_page_cascades() {
        let f = synced().await;
        let inventory = Inventory::from_json(THREE_GROUPS).unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();

        f.storage.remove(format!("{PREFIX}/test.html")).await;
        let request = SyncRequest::new(VERSION, PREFIX, marker(2));
        let report = sync_version(&f.backend, &f.repository, &f.ctx, &request).await.unwrap();
        assert_eq!(report.deleted, ["test.html"]);
        let objects = f.repository.list_domain_objects(VERSION).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].canonical_name, "testFunction");
    }

    #[tokio::test]
    async fn test_import_from_storage() {
        let f = synced().await;
        let body = "pip.main py:function 1 index.html#$ -\nInstalling std:doc -1 api/ Installation guide\n";
        f.storage.put(format!("{PREFIX}/{OBJECTS_INV}"), objects_inv(body)).await;

        let report = import_inventory_from_storage(&f.backend, &f.repository, &f.ctx, VERSION, PREFIX, &marker(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.imported, 2);
        let objects = f.repository.list_domain_objects(VERSION).await.unwrap();
        let main = objects.iter().find(|object| object.canonical_name == "pip.main").unwrap();
        assert_eq!(main.anchor, "pip.main");
        assert_eq!(main.display_name, "pip.main");
        let guide = objects.iter().find(|object| object.domain == "std").unwrap();
        assert_eq!(guide.page_id, page_id(&f.repository, "api/index.html").await);
        assert_eq!(guide.display_name, "Installation guide");
    }

    #[tokio::test]
    async fn test_missing_inventory_changes_nothing() {
        let f = synced().await;
        let inventory = Inventory::from_json(THREE_GROUPS).unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();

        let report =
            import_inventory_from_storage(&f.backend, &f.repository, &f.ctx, VERSION, PREFIX, &marker(2)).await.unwrap();
        assert!(report.is_none());
        assert_eq!(f.repository.count_domain_objects(VERSION).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_inventory_changes_nothing() {
        let f = synced().await;
        let inventory = Inventory::from_json(THREE_GROUPS).unwrap();
        import_inventory(&f.repository, &f.ctx, VERSION, &marker(1), &inventory).await.unwrap();
        f.storage.put(format!("{PREFIX}/{OBJECTS_INV}"), "# Sphinx inventory version 1\n").await;

        let err = import_inventory_from_storage(&f.backend, &f.repository, &f.ctx, VERSION, PREFIX, &marker(2))
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Inventory);
        assert!(!err.is_retryable());
        assert_eq!(f.repository.count_domain_objects(VERSION).await.unwrap(), 3);
    }
}
