//! Catalog entities.
//!
//! A catalog entry is one file of a version's current build output. Entries
//! are either [`Plain`](EntryKind::Plain) files kept for serving, or
//! [`Page`](EntryKind::Page)s eligible for search ranking. Pages may own
//! [`DomainObject`]s imported from the build's cross-reference inventory.

use std::ops::Deref;

/// Identifies the build that last saw an entry.
///
/// Every sync pass stamps the marker onto every surviving entry, even when
/// nothing else about the entry changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildMarker {
    /// Source revision the build was produced from.
    pub commit: String,
    /// Monotonic build counter.
    pub build_id: i64,
}
impl BuildMarker {
    pub fn new(commit: impl Into<String>, build_id: i64) -> Self {
        Self { commit: commit.into(), build_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Cataloged for serving only.
    Plain,
    /// Cataloged for serving and search.
    Page {
        rank: i32,
        /// Present once the page content has been read.
        content_hash: Option<String>,
    },
}
impl EntryKind {
    pub fn is_page(&self) -> bool {
        matches!(self, Self::Page { .. })
    }

    pub fn rank(&self) -> Option<i32> {
        match self {
            Self::Page { rank, .. } => Some(*rank),
            Self::Plain => None,
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Page { content_hash, .. } => content_hash.as_deref(),
            Self::Plain => None,
        }
    }
}

/// One file belonging to a version's build output.
///
/// Identity is `(version_id, path)`: at most one live entry per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub version_id: i64,
    /// Relative to the version's output root, `/`-separated.
    pub path: String,
    /// Basename of `path`.
    pub name: String,
    pub commit: String,
    pub build_id: i64,
    pub kind: EntryKind,
}
impl CatalogEntry {
    /// Create a new entry for `path`, deriving its name from the last path
    /// segment.
    pub fn new(version_id: i64, path: impl Into<String>, marker: &BuildMarker, kind: EntryKind) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            version_id,
            path,
            name,
            commit: marker.commit.clone(),
            build_id: marker.build_id,
            kind,
        }
    }

    pub fn marker(&self) -> BuildMarker {
        BuildMarker::new(self.commit.clone(), self.build_id)
    }

    pub fn with_marker(mut self, marker: &BuildMarker) -> Self {
        self.commit = marker.commit.clone();
        self.build_id = marker.build_id;
        self
    }

    pub fn is_page(&self) -> bool {
        self.kind.is_page()
    }
}

/// A persisted [`CatalogEntry`] and its row identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: i64,
    pub entry: CatalogEntry,
}
impl Deref for StoredEntry {
    type Target = CatalogEntry;
    fn deref(&self) -> &CatalogEntry {
        &self.entry
    }
}

/// One cross-reference target exported by a page.
///
/// Identity is `(page_id, domain, object_type, canonical_name)`. Domain
/// objects live and die with their page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainObject {
    pub page_id: i64,
    /// Namespace such as `py`, `js` or `std`.
    pub domain: String,
    /// Role within the domain, such as `function` or `class`.
    pub object_type: String,
    pub canonical_name: String,
    /// In-page fragment without the `#`; may be empty.
    pub anchor: String,
    pub display_name: String,
    pub commit: String,
    pub build_id: i64,
}
impl DomainObject {
    /// The `domain:role` key the object was exported under.
    pub fn role_key(&self) -> String {
        format!("{}:{}", self.domain, self.object_type)
    }
}
