//! Page enumeration for image archives

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Image extensions recognised as pages, lowercase
pub const PAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// One page of an archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageEntry {
    pub index: u32,
    /// Entry path inside the container
    pub name: String,
}

/// Whether an archive entry name is a page image
pub fn is_page_name(name: &str) -> bool {
    if name.ends_with('/') || name.ends_with('\\') {
        return false;
    }

    Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            PAGE_EXTENSIONS.iter().any(|page_ext| extension.eq_ignore_ascii_case(page_ext))
        })
        .unwrap_or(false)
}

/// Ordered, immutable list of an archive's pages
///
/// Built once at open. Non-image entries are dropped, duplicate names keep
/// their first occurrence, and pages sort case-insensitively with the raw
/// name as tie-break so the order is total.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    entries: Arc<[PageEntry]>,
}

impl ArchiveIndex {
    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut names: Vec<String> = names
            .into_iter()
            .filter(|name| is_page_name(name))
            .filter(|name| seen.insert(name.clone()))
            .collect();

        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

        let entries: Vec<PageEntry> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| PageEntry { index: index as u32, name })
            .collect();

        Self { entries: entries.into() }
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&PageEntry> {
        self.entries.get(index as usize)
    }

    /// Shared snapshot of the entries
    pub fn entries(&self) -> Arc<[PageEntry]> {
        Arc::clone(&self.entries)
    }
}
