//! Directory snapshots shared by the local and remote views.

use serde::{Deserialize, Serialize};

/// Kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One filesystem object inside a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Single path segment, never contains a separator
    pub name: String,
    pub kind: EntryKind,
    /// Byte length for files, 0 for directories
    pub size: u64,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Snapshot of one directory, sorted ascending by name with unique names.
///
/// The only way to build one is [`DirectoryListing::from_entries`], which
/// re-establishes the ordering regardless of the order entries arrived in.
/// Listings are replaced wholesale on refresh, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectoryListing {
    entries: Vec<Entry>,
}

impl DirectoryListing {
    pub fn from_entries(mut entries: Vec<Entry>) -> Self {
        // String ordering is byte-wise on the UTF-8 encoding.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|next, prev| next.name == prev.name);
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a DirectoryListing {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(listing: &DirectoryListing) -> Vec<&str> {
        listing.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_sorted_bytewise() {
        let listing = DirectoryListing::from_entries(vec![
            Entry::file("b.txt", 1),
            Entry::directory("Zeta"),
            Entry::file("a.txt", 2),
            Entry::directory("_build"),
        ]);
        // Uppercase sorts before underscore, underscore before lowercase.
        assert_eq!(names(&listing), vec!["Zeta", "_build", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let listing = DirectoryListing::from_entries(vec![
            Entry::file("same", 1),
            Entry::file("other", 3),
            Entry::file("same", 2),
        ]);
        assert_eq!(names(&listing), vec!["other", "same"]);
    }

    #[test]
    fn test_get_by_name() {
        let listing = DirectoryListing::from_entries(vec![
            Entry::file("notes.md", 42),
            Entry::directory("src"),
        ]);
        assert_eq!(listing.get("notes.md").map(|e| e.size), Some(42));
        assert!(listing.get("src").unwrap().is_dir());
        assert!(listing.get("missing").is_none());
    }

    #[test]
    fn test_empty() {
        let listing = DirectoryListing::from_entries(Vec::new());
        assert!(listing.is_empty());
        assert_eq!(listing.len(), 0);
    }
}
