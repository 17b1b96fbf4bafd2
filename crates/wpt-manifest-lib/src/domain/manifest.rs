use std::collections::{HashMap, HashSet};

use super::{ItemType, ManifestItem, Revision};

/// Domain entity owning the path → items index of a test tree.
/// Holds no I/O; persistence is handled by infrastructure's `FileManifest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    rev: Option<Revision>,
    url_base: String,
    items: HashMap<String, HashSet<ManifestItem>>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Manifest {
    /// Create an empty, never-indexed manifest mounted at `url_base`.
    #[must_use]
    pub fn new(url_base: &str) -> Self {
        Self {
            rev: None,
            url_base: url_base.to_owned(),
            items: HashMap::new(),
        }
    }

    /// Create a `Manifest` from previously stored parts. Empty item sets are dropped.
    #[must_use]
    pub fn from_parts(
        rev: Option<Revision>,
        url_base: &str,
        items: HashMap<String, HashSet<ManifestItem>>,
    ) -> Self {
        let mut manifest = Self::new(url_base);
        manifest.rev = rev;
        manifest.items = items.into_iter().filter(|(_, set)| !set.is_empty()).collect();
        manifest
    }

    /// The revision this manifest was last indexed at.
    #[must_use]
    pub fn rev(&self) -> Option<&Revision> {
        self.rev.as_ref()
    }

    /// Record the revision the tree reported during the current update.
    pub fn advance_rev(&mut self, rev: Option<Revision>) {
        self.rev = rev;
    }

    #[must_use]
    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    /// Items located at `path`.
    #[must_use]
    pub fn items_for(&self, path: &str) -> Option<&HashSet<ManifestItem>> {
        self.items.get(path)
    }

    /// Check if the manifest has an entry for `path`.
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        self.items.contains_key(path)
    }

    /// All indexed paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.items.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Iterate over `(path, items)` entries in arbitrary order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &HashSet<ManifestItem>)> {
        self.items.iter().map(|(path, set)| (path.as_str(), set))
    }

    /// Every item of one harness type with its path, sorted by path then key.
    #[must_use]
    pub fn items_of_type(&self, item_type: ItemType) -> Vec<(&str, &ManifestItem)> {
        let mut found: Vec<(&str, &ManifestItem)> = self
            .items
            .iter()
            .flat_map(|(path, set)| set.iter().map(move |item| (path.as_str(), item)))
            .filter(|(_, item)| item.item_type() == item_type)
            .collect();
        found.sort_unstable();
        found
    }

    /// Total number of items across all paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.values().map(HashSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace everything stored at `path` with `items`.
    ///
    /// A later item overwrites an earlier one with the same key. If `items` is
    /// empty the path is left absent.
    pub fn replace<I>(&mut self, path: &str, items: I)
    where
        I: IntoIterator<Item = ManifestItem>,
    {
        let mut set = HashSet::new();
        for item in items {
            set.replace(item);
        }
        if set.is_empty() {
            self.items.remove(path);
        } else {
            self.items.insert(path.to_owned(), set);
        }
    }

    /// Add a single item at `path`, overwriting any item with the same key.
    pub fn insert(&mut self, path: &str, item: ManifestItem) -> Option<ManifestItem> {
        self.items.entry(path.to_owned()).or_default().replace(item)
    }

    /// Remove the entry for `path`, returning its items.
    pub fn remove(&mut self, path: &str) -> Option<HashSet<ManifestItem>> {
        self.items.remove(path)
    }

    /// Keep only the paths for which `keep` returns true; returns the removed paths, sorted.
    pub fn retain_paths<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut removed: Vec<String> = self
            .items
            .keys()
            .filter(|path| !keep(path))
            .cloned()
            .collect();
        removed.sort_unstable();
        for path in &removed {
            self.items.remove(path);
        }
        removed
    }
}
