use docsync_catalog::models::DomainObject;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DomainObjectRow {
    page_id: i64,
    domain: String,
    object_type: String,
    canonical_name: String,
    anchor: String,
    display_name: String,
    commit_ref: String,
    build_id: i64,
}
impl From<DomainObjectRow> for DomainObject {
    fn from(row: DomainObjectRow) -> Self {
        Self {
            page_id: row.page_id,
            domain: row.domain,
            object_type: row.object_type,
            canonical_name: row.canonical_name,
            anchor: row.anchor,
            display_name: row.display_name,
            commit: row.commit_ref,
            build_id: row.build_id,
        }
    }
}
