use crate::error::{ErrorKind, Result, WriteResultExt};
use crate::models::{EntryColumns, EntryRow};
use docsync_catalog::models::{CatalogEntry, DomainObject, StoredEntry};
use exn::ResultExt;
use sqlx::{Sqlite, Transaction};
use tracing::instrument;

/// All catalog writes for one version, applied atomically.
///
/// Nothing is visible to other readers until [`commit`](Self::commit).
/// Dropping a unit of work without committing rolls it back, as does
/// committing one created by a dry-run [`Repository`](crate::Repository).
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    version_id: i64,
    dry_run: bool,
}
impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, version_id: i64, dry_run: bool) -> Self {
        Self { tx, version_id, dry_run }
    }

    pub fn version_id(&self) -> i64 {
        self.version_id
    }

    fn ensure_version(&self, version_id: i64) -> Result<()> {
        if version_id != self.version_id {
            exn::bail!(ErrorKind::Constraint(format!(
                "entry of version {version_id} written in a unit of work for version {}",
                self.version_id
            )));
        }
        Ok(())
    }

    /// Page entries of this version as seen inside the transaction.
    pub async fn list_pages(&mut self) -> Result<Vec<StoredEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_pages_for_version.sql"))
            .bind(self.version_id)
            .fetch_all(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(StoredEntry::try_from).collect()
    }

    /// Insert a new entry, returning its id.
    ///
    /// Fails with [`Constraint`](ErrorKind::Constraint) if the version
    /// already has an entry at the same path.
    pub async fn insert_entry(&mut self, entry: &CatalogEntry) -> Result<i64> {
        self.ensure_version(entry.version_id)?;
        let columns = EntryColumns::try_from(entry)?;
        sqlx::query_scalar::<_, i64>(include_str!("../queries/insert_entry.sql"))
            .bind(columns.version_id)
            .bind(columns.path)
            .bind(columns.name)
            .bind(columns.kind)
            .bind(columns.rank)
            .bind(columns.content_hash)
            .bind(columns.commit_ref)
            .bind(columns.build_id)
            .fetch_one(&mut *self.tx)
            .await
            .or_raise_write()
    }

    /// Overwrite the mutable columns (kind, rank, hash and build marker) of
    /// an existing entry. Returns `false` if no such entry exists.
    pub async fn update_entry(&mut self, entry: &StoredEntry) -> Result<bool> {
        self.ensure_version(entry.version_id)?;
        let columns = EntryColumns::try_from(&entry.entry)?;
        let result = sqlx::query(include_str!("../queries/update_entry.sql"))
            .bind(columns.name)
            .bind(columns.kind)
            .bind(columns.rank)
            .bind(columns.content_hash)
            .bind(columns.commit_ref)
            .bind(columns.build_id)
            .bind(entry.id)
            .bind(self.version_id)
            .execute(&mut *self.tx)
            .await
            .or_raise_write()?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an entry and, through the cascade, its domain objects.
    pub async fn delete_entry(&mut self, id: i64) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(id)
            .bind(self.version_id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every domain object of every page in this version.
    pub async fn clear_domain_objects(&mut self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_domain_objects_for_version.sql"))
            .bind(self.version_id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn clear_domain_objects_for_page(&mut self, page_id: i64) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_domain_objects_for_page.sql"))
            .bind(page_id)
            .execute(&mut *self.tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Insert a domain object for a page of this version.
    ///
    /// Fails with [`Constraint`](ErrorKind::Constraint) if `page_id` is not
    /// a page of this version, or the page already exports an object with
    /// the same identity.
    pub async fn insert_domain_object(&mut self, object: &DomainObject) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/insert_domain_object.sql"))
            .bind(&object.domain)
            .bind(&object.object_type)
            .bind(&object.canonical_name)
            .bind(&object.anchor)
            .bind(&object.display_name)
            .bind(&object.commit)
            .bind(object.build_id)
            .bind(object.page_id)
            .bind(self.version_id)
            .execute(&mut *self.tx)
            .await
            .or_raise_write()?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::Constraint(format!(
                "entry {} is not a page of version {}",
                object.page_id, self.version_id
            )));
        }
        Ok(())
    }

    /// Make every write visible, or roll them all back in dry-run mode.
    #[instrument(skip_all, fields(version_id = self.version_id, dry_run = self.dry_run))]
    pub async fn commit(self) -> Result<()> {
        if self.dry_run {
            tracing::info!("dry run, rolling back catalog changes");
            return self.rollback().await;
        }
        self.tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.or_raise(|| ErrorKind::Database)
    }
}
