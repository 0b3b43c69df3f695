use crate::error::{Error, ErrorKind};
use docsync_catalog::models::{CatalogEntry, EntryKind, StoredEntry};
use exn::{OptionExt, ResultExt};

const KIND_PLAIN: &str = "plain";
const KIND_PAGE: &str = "page";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    id: i64,
    version_id: i64,
    path: String,
    name: String,
    kind: String,
    #[sqlx(default)]
    rank: Option<i64>,
    #[sqlx(default)]
    content_hash: Option<String>,
    commit_ref: String,
    build_id: i64,
}
impl TryFrom<EntryRow> for StoredEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.rank, row.content_hash) {
            (KIND_PLAIN, None, None) => EntryKind::Plain,
            (KIND_PAGE, Some(rank), content_hash) => EntryKind::Page {
                rank: i32::try_from(rank).or_raise(|| ErrorKind::InvalidData("page rank"))?,
                content_hash,
            },
            _ => exn::bail!(ErrorKind::InvalidData("entry kind")),
        };
        Ok(StoredEntry {
            id: row.id,
            entry: CatalogEntry {
                version_id: row.version_id,
                path: row.path,
                name: row.name,
                commit: row.commit_ref,
                build_id: row.build_id,
                kind,
            },
        })
    }
}

/// Bindable column values of an entry, borrowed from the model.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EntryColumns<'a> {
    pub(crate) version_id: i64,
    pub(crate) path: &'a str,
    pub(crate) name: &'a str,
    pub(crate) kind: &'static str,
    pub(crate) rank: Option<i64>,
    pub(crate) content_hash: Option<&'a str>,
    pub(crate) commit_ref: &'a str,
    pub(crate) build_id: i64,
}
impl<'a> TryFrom<&'a CatalogEntry> for EntryColumns<'a> {
    type Error = Error;
    fn try_from(entry: &'a CatalogEntry) -> Result<Self, Self::Error> {
        let (kind, rank, content_hash) = match &entry.kind {
            EntryKind::Plain => (KIND_PLAIN, None, None),
            EntryKind::Page { rank, content_hash } => (KIND_PAGE, Some(i64::from(*rank)), content_hash.as_deref()),
        };
        Ok(Self {
            version_id: entry.version_id,
            path: Some(entry.path.as_str()).filter(|p| !p.is_empty()).ok_or_raise(|| ErrorKind::InvalidData("empty path"))?,
            name: &entry.name,
            kind,
            rank,
            content_hash,
            commit_ref: &entry.commit,
            build_id: entry.build_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_catalog::models::BuildMarker;
    use rstest::rstest;

    fn row(kind: &str, rank: Option<i64>, content_hash: Option<&str>) -> EntryRow {
        EntryRow {
            id: 9,
            version_id: 1,
            path: "api/index.html".to_string(),
            name: "index.html".to_string(),
            kind: kind.to_string(),
            rank,
            content_hash: content_hash.map(str::to_string),
            commit_ref: "commit01".to_string(),
            build_id: 1,
        }
    }

    #[test]
    fn test_page_row_to_model() {
        let stored = StoredEntry::try_from(row("page", Some(5), Some("abc"))).unwrap();
        assert_eq!(stored.id, 9);
        assert_eq!(stored.kind, EntryKind::Page { rank: 5, content_hash: Some("abc".to_string()) });
        assert_eq!(stored.marker(), BuildMarker::new("commit01", 1));
    }

    #[rstest]
    #[case(row("plain", Some(1), None))]
    #[case(row("plain", None, Some("abc")))]
    #[case(row("page", None, None))]
    #[case(row("page", Some(i64::MAX), None))]
    #[case(row("image", None, None))]
    fn test_invalid_rows(#[case] row: EntryRow) {
        let err = StoredEntry::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }

    #[test]
    fn test_model_to_columns() {
        let marker = BuildMarker::new("commit02", 2);
        let page = CatalogEntry::new(1, "test.html", &marker, EntryKind::Page { rank: -3, content_hash: None });
        let columns = EntryColumns::try_from(&page).unwrap();
        assert_eq!((columns.kind, columns.rank, columns.content_hash), ("page", Some(-3), None));
        assert_eq!((columns.commit_ref, columns.build_id), ("commit02", 2));

        let plain = CatalogEntry::new(1, "style.css", &marker, EntryKind::Plain);
        let columns = EntryColumns::try_from(&plain).unwrap();
        assert_eq!((columns.kind, columns.rank), ("plain", None));
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let entry = CatalogEntry::new(1, "", &BuildMarker::new("c", 1), EntryKind::Plain);
        assert!(EntryColumns::try_from(&entry).is_err());
    }
}
