use serde::Serialize;
use std::{collections::HashSet, fmt};

/// Metadata read from a single open page, before ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub target_id: String,
}

impl PageMetadata {
    pub fn new(url: impl Into<String>, title: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self { url: url.into(), title: title.into(), target_id: target_id.into() }
    }
}

/// An open tab as listed to the user
///
/// `index` is 1-based and only meaningful within the enumeration that produced it.
/// `target_id` identifies the underlying tab for as long as it stays open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabDescriptor {
    pub index: usize,
    pub url: String,
    pub title: String,
    pub target_id: String,
}

/// Deterministically ordered list of open tabs
///
/// Tabs are sorted by URL, then title, then target id, so the same browser state always
/// produces the same indices regardless of the order the browser reported them in.
#[derive(Debug, Clone, Default)]
pub struct TabCatalog {
    tabs: Vec<TabDescriptor>,
    skipped: usize,
}

impl TabCatalog {
    /// Build a catalog from per-page metadata reads
    ///
    /// Pages whose metadata could not be read are left out and counted in [`skipped`](Self::skipped).
    pub fn from_pages<I, E>(pages: I) -> Self
    where
        I: IntoIterator<Item = Result<PageMetadata, E>>,
        E: fmt::Display,
    {
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut readable: Vec<PageMetadata> = Vec::new();

        for page in pages {
            match page {
                Ok(meta) => {
                    if seen.insert(meta.target_id.clone()) {
                        readable.push(meta);
                    } else {
                        log::warn!("Tab {} was reported twice; listing it once", meta.target_id);
                    }
                }
                Err(e) => {
                    log::warn!("Skipping tab whose metadata could not be read: {}", e);
                    skipped += 1;
                }
            }
        }

        readable.sort_by(|a, b| {
            a.url
                .cmp(&b.url)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.target_id.cmp(&b.target_id))
        });

        let tabs = readable
            .into_iter()
            .enumerate()
            .map(|(i, meta)| TabDescriptor {
                index: i + 1,
                url: meta.url,
                title: meta.title,
                target_id: meta.target_id,
            })
            .collect();

        Self { tabs, skipped }
    }

    pub fn tabs(&self) -> &[TabDescriptor] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Number of pages left out because their metadata could not be read
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Look up a tab by its 1-based index
    pub fn get(&self, index: usize) -> Option<&TabDescriptor> {
        index.checked_sub(1).and_then(|i| self.tabs.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabDescriptor> {
        self.tabs.iter()
    }
}

impl fmt::Display for TabCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tabs.is_empty() {
            return writeln!(f, "No tabs open");
        }

        writeln!(f, "Open tabs ({}):", self.tabs.len())?;
        let width = self.tabs.len().to_string().len();
        for tab in &self.tabs {
            if tab.title.is_empty() {
                writeln!(f, "  [{:>width$}] {}", tab.index, tab.url, width = width)?;
            } else {
                writeln!(f, "  [{:>width$}] {} ({})", tab.index, tab.title, tab.url, width = width)?;
            }
        }
        if self.skipped > 0 {
            writeln!(f, "  ({} tab(s) could not be read)", self.skipped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(entries: &[(&str, &str, &str)]) -> Vec<Result<PageMetadata, String>> {
        entries.iter().map(|(url, title, id)| Ok(PageMetadata::new(*url, *title, *id))).collect()
    }

    #[test]
    fn test_sorted_by_url_title_target() {
        let catalog = TabCatalog::from_pages(pages(&[
            ("https://b.com", "B", "t1"),
            ("https://a.com", "Z", "t2"),
            ("https://a.com", "A", "t4"),
            ("https://a.com", "A", "t3"),
        ]));

        let order: Vec<_> = catalog.iter().map(|t| (t.index, t.target_id.as_str())).collect();
        assert_eq!(order, vec![(1, "t3"), (2, "t4"), (3, "t2"), (4, "t1")]);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let forward = pages(&[("https://x.com", "X", "1"), ("https://y.com", "Y", "2"), ("https://w.com", "W", "3")]);
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = TabCatalog::from_pages(forward);
        let b = TabCatalog::from_pages(reversed);
        assert_eq!(a.tabs(), b.tabs());
    }

    #[test]
    fn test_unreadable_pages_are_counted() {
        let catalog = TabCatalog::from_pages(vec![
            Ok(PageMetadata::new("https://a.com", "A", "1")),
            Err("target closed".to_string()),
            Ok(PageMetadata::new("https://b.com", "B", "2")),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.skipped(), 1);
        assert_eq!(catalog.get(2).unwrap().url, "https://b.com");
    }

    #[test]
    fn test_duplicate_target_ids_listed_once() {
        let catalog = TabCatalog::from_pages(pages(&[("https://a.com", "A", "1"), ("https://a.com", "A", "1")]));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_get_is_one_based() {
        let catalog = TabCatalog::from_pages(pages(&[("https://a.com", "A", "1")]));
        assert!(catalog.get(0).is_none());
        assert_eq!(catalog.get(1).unwrap().target_id, "1");
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn test_display_lists_tabs() {
        let catalog = TabCatalog::from_pages(pages(&[("https://a.com", "Alpha", "1"), ("about:blank", "", "2")]));
        let listing = catalog.to_string();
        assert!(listing.contains("[1] about:blank"));
        assert!(listing.contains("[2] Alpha (https://a.com)"));
    }
}
