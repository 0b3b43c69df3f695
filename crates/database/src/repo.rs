//! Read access to the catalog, and the entry point for writing it.
//!
//! Reads go straight to the pool. Writes always happen inside a
//! [`UnitOfWork`] scoped to one version, so a sync or import pass is applied
//! completely or not at all.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{DomainObjectRow, EntryRow};
use crate::unit::UnitOfWork;
use docsync_catalog::models::{DomainObject, StoredEntry};
use exn::ResultExt;
use sqlx::SqlitePool;

/// Repository for catalog entries and their domain objects.
///
/// # Relationships
///
/// - Entries belong to a version; `(version_id, path)` is unique
/// - Domain objects belong to a page entry and are deleted with it
/// - Only page entries may own domain objects
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    /// With `dry_run`, units of work roll back instead of committing.
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Start a write transaction for one version.
    ///
    /// On an in-memory database the transaction holds the only connection;
    /// don't call other repository methods until it is committed or dropped.
    pub async fn begin(&self, version_id: i64) -> Result<UnitOfWork> {
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Ok(UnitOfWork::new(tx, version_id, self.dry_run))
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// All entries of a version, pages and plain files, ordered by path.
    pub async fn list_entries(&self, version_id: i64) -> Result<Vec<StoredEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_entries_for_version.sql"))
            .bind(version_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(StoredEntry::try_from).collect()
    }

    /// The page entries of a version, ordered by path.
    pub async fn list_pages(&self, version_id: i64) -> Result<Vec<StoredEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_pages_for_version.sql"))
            .bind(version_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(StoredEntry::try_from).collect()
    }

    pub async fn get_entry(&self, version_id: i64, path: impl AsRef<str>) -> Result<Option<StoredEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry_by_path.sql"))
            .bind(version_id)
            .bind(path.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(StoredEntry::try_from).transpose()
    }

    /// Like [`get_entry`](Self::get_entry), but `None` for plain entries.
    pub async fn get_page(&self, version_id: i64, path: impl AsRef<str>) -> Result<Option<StoredEntry>> {
        Ok(self.get_entry(version_id, path).await?.filter(|entry| entry.is_page()))
    }

    pub async fn count_entries(&self, version_id: i64) -> Result<u64> {
        self.count(include_str!("../queries/count_entries_for_version.sql"), version_id).await
    }

    pub async fn count_pages(&self, version_id: i64) -> Result<u64> {
        self.count(include_str!("../queries/count_pages_for_version.sql"), version_id).await
    }

    // =========================================================================
    // Domain objects
    // =========================================================================

    /// Domain objects of every page in a version, ordered by page path.
    pub async fn list_domain_objects(&self, version_id: i64) -> Result<Vec<DomainObject>> {
        let rows: Vec<DomainObjectRow> =
            sqlx::query_as(include_str!("../queries/list_domain_objects_for_version.sql"))
                .bind(version_id)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(DomainObject::from).collect())
    }

    pub async fn list_domain_objects_for_page(&self, page_id: i64) -> Result<Vec<DomainObject>> {
        let rows: Vec<DomainObjectRow> = sqlx::query_as(include_str!("../queries/list_domain_objects_for_page.sql"))
            .bind(page_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(DomainObject::from).collect())
    }

    pub async fn count_domain_objects(&self, version_id: i64) -> Result<u64> {
        self.count(include_str!("../queries/count_domain_objects_for_version.sql"), version_id).await
    }

    async fn count(&self, query: &'static str, version_id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(query)
            .bind(version_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }
}
