//! Catalog diffing.
//!
//! Compares what a version's catalog currently holds against the paths a
//! build just produced. The differ does not care whether an entry is a page
//! or a plain file; classification happens in the caller.

use crate::models::{CatalogEntry, StoredEntry};
use std::collections::{BTreeSet, HashSet};

/// Anything identified within a version by its catalog path.
pub trait Keyed {
    fn path(&self) -> &str;
}
impl Keyed for CatalogEntry {
    fn path(&self) -> &str {
        &self.path
    }
}
impl Keyed for StoredEntry {
    fn path(&self) -> &str {
        &self.entry.path
    }
}

/// The changes needed to make a catalog mirror a build.
///
/// Every existing entry lands in exactly one of `touch`, `delete` or
/// `retain`. All four sets are sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<E> {
    /// Discovered paths with no existing entry.
    pub create: Vec<String>,
    /// Existing entries whose path was discovered again.
    pub touch: Vec<E>,
    /// Existing entries that disappeared from the build.
    pub delete: Vec<E>,
    /// Existing entries that disappeared but are protected from deletion.
    pub retain: Vec<E>,
}
impl<E> Default for Diff<E> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            touch: Vec::new(),
            delete: Vec::new(),
            retain: Vec::new(),
        }
    }
}
impl<E> Diff<E> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.touch.is_empty() && self.delete.is_empty() && self.retain.is_empty()
    }
}

/// Split `existing` entries against the `discovered` paths.
///
/// Paths in `protected` are never routed to `delete`. If `existing` holds
/// more than one entry for the same path, the first one seen is kept and the
/// others are deleted regardless of protection.
///
/// ```
/// use docsync_catalog::diff;
/// use std::collections::{BTreeSet, HashSet};
///
/// struct Row(&'static str);
/// impl docsync_catalog::Keyed for Row {
///     fn path(&self) -> &str { self.0 }
/// }
///
/// let discovered = BTreeSet::from(["a.html".to_string(), "c.html".to_string()]);
/// let result = diff([Row("a.html"), Row("b.html")], &discovered, &HashSet::new());
/// assert_eq!(result.create, ["c.html"]);
/// assert_eq!(result.touch.iter().map(|r| r.0).collect::<Vec<_>>(), ["a.html"]);
/// assert_eq!(result.delete.iter().map(|r| r.0).collect::<Vec<_>>(), ["b.html"]);
/// ```
pub fn diff<E: Keyed>(
    existing: impl IntoIterator<Item = E>,
    discovered: &BTreeSet<String>,
    protected: &HashSet<String>,
) -> Diff<E> {
    let mut result = Diff::default();
    let mut seen: HashSet<String> = HashSet::new();
    for entry in existing {
        if !seen.insert(entry.path().to_string()) {
            result.delete.push(entry);
        } else if discovered.contains(entry.path()) {
            result.touch.push(entry);
        } else if protected.contains(entry.path()) {
            result.retain.push(entry);
        } else {
            result.delete.push(entry);
        }
    }
    result.create = discovered.iter().filter(|path| !seen.contains(*path)).cloned().collect();
    // Stable sorts, so duplicates keep their input order.
    result.touch.sort_by(|a, b| a.path().cmp(b.path()));
    result.delete.sort_by(|a, b| a.path().cmp(b.path()));
    result.retain.sort_by(|a, b| a.path().cmp(b.path()));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildMarker, EntryKind};

    fn stored(id: i64, path: &str) -> StoredEntry {
        StoredEntry {
            id,
            entry: CatalogEntry::new(1, path, &BuildMarker::new("commit01", 1), EntryKind::Plain),
        }
    }

    fn paths<E: Keyed>(entries: &[E]) -> Vec<&str> {
        entries.iter().map(|e| e.path()).collect()
    }

    fn discovered(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_catalog_creates_everything() {
        let result = diff(Vec::<StoredEntry>::new(), &discovered(&["test.html", "api/index.html"]), &HashSet::new());
        assert_eq!(result.create, ["api/index.html", "test.html"]);
        assert!(result.touch.is_empty());
        assert!(result.delete.is_empty());
    }

    #[test]
    fn test_missing_path_is_deleted() {
        let existing = vec![stored(1, "a.html"), stored(2, "b.html")];
        let result = diff(existing, &discovered(&["a.html"]), &HashSet::new());
        assert!(result.create.is_empty());
        assert_eq!(paths(&result.touch), ["a.html"]);
        assert_eq!(paths(&result.delete), ["b.html"]);
        assert_eq!(result.delete[0].id, 2);
    }

    #[test]
    fn test_protected_path_is_retained() {
        let existing = vec![stored(1, "a.html"), stored(2, "b.html"), stored(3, "c.html")];
        let protected = HashSet::from(["b.html".to_string(), "a.html".to_string()]);
        let result = diff(existing, &discovered(&["a.html"]), &protected);
        assert_eq!(paths(&result.touch), ["a.html"]);
        assert_eq!(paths(&result.retain), ["b.html"]);
        assert_eq!(paths(&result.delete), ["c.html"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let existing = vec![stored(7, "a.html"), stored(3, "a.html")];
        let result = diff(existing, &discovered(&["a.html"]), &HashSet::new());
        assert_eq!(result.touch.len(), 1);
        assert_eq!(result.touch[0].id, 7);
        assert_eq!(result.delete.len(), 1);
        assert_eq!(result.delete[0].id, 3);
    }

    #[test]
    fn test_duplicates_of_protected_path_are_still_deleted() {
        let existing = vec![stored(1, "a.html"), stored(2, "a.html")];
        let protected = HashSet::from(["a.html".to_string()]);
        let result = diff(existing, &BTreeSet::new(), &protected);
        assert_eq!(result.retain.len(), 1);
        assert_eq!(result.retain[0].id, 1);
        assert_eq!(result.delete.len(), 1);
        assert_eq!(result.delete[0].id, 2);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let existing = vec![stored(3, "z.html"), stored(1, "a.html"), stored(2, "m.html")];
        let found = discovered(&["m.html", "new.html", "a.html"]);
        let first = diff(existing.clone(), &found, &HashSet::new());
        let mut reversed = existing;
        reversed.reverse();
        let second = diff(reversed, &found, &HashSet::new());
        assert_eq!(first, second);
        assert_eq!(first.create, ["new.html"]);
        assert_eq!(paths(&first.touch), ["a.html", "m.html"]);
        assert_eq!(paths(&first.delete), ["z.html"]);
    }

    #[test]
    fn test_empty_inputs() {
        let result = diff(Vec::<CatalogEntry>::new(), &BTreeSet::new(), &HashSet::new());
        assert!(result.is_empty());
    }
}
