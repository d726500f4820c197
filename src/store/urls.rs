use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::app::{ForagerError, Result};
use crate::domain::WorkItem;

/// Persisted list of pending work: one row per product URL, with the
/// discovery metadata as extra columns.
pub struct UrlStore {
    path: PathBuf,
}

impl UrlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all work items; a missing file is an empty store.
    pub fn load(&self) -> Result<Vec<WorkItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let url_idx = headers
            .iter()
            .position(|h| h == "url")
            .ok_or_else(|| ForagerError::MissingUrlColumn(self.path.clone()))?;

        let mut items = Vec::new();
        for row in reader.records() {
            let row = row?;
            let url = row.get(url_idx).unwrap_or("").to_string();
            if url.is_empty() {
                continue;
            }

            let mut item = WorkItem::new(url);
            for (idx, cell) in row.iter().enumerate() {
                if idx == url_idx || cell.is_empty() {
                    continue;
                }
                if let Some(key) = headers.get(idx) {
                    item.metadata.insert(key.to_string(), cell.to_string());
                }
            }
            items.push(item);
        }

        Ok(items)
    }

    /// `existing` followed by every discovered item whose url is new, in
    /// discovery order. Pure; neither input is mutated; every url appears
    /// exactly once in the result.
    pub fn merge(existing: &[WorkItem], discovered: &[WorkItem]) -> Vec<WorkItem> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut merged = Vec::with_capacity(existing.len());

        for item in existing {
            if seen.insert(item.url.as_str()) {
                merged.push(item.clone());
            }
        }
        for item in discovered {
            if seen.insert(item.url.as_str()) {
                merged.push(item.clone());
            }
        }

        merged
    }

    /// Overwrite the store: exactly one row per unique url, first
    /// occurrence wins. Atomic rewrite through a temp file.
    pub fn save(&self, items: &[WorkItem]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        let deduped: Vec<&WorkItem> = items
            .iter()
            .filter(|item| seen.insert(item.url.as_str()))
            .collect();

        let columns: BTreeSet<&str> = deduped
            .iter()
            .flat_map(|item| item.metadata.keys().map(String::as_str))
            .collect();

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let tmp = tempfile::NamedTempFile::new_in(&parent)?;
        let mut writer = csv::Writer::from_writer(tmp);

        let mut header = vec!["url"];
        header.extend(columns.iter().copied());
        writer.write_record(&header)?;

        for item in &deduped {
            let mut row = vec![item.url.as_str()];
            row.extend(
                columns
                    .iter()
                    .map(|key| item.metadata.get(*key).map(String::as_str).unwrap_or("")),
            );
            writer.write_record(&row)?;
        }

        let tmp = writer.into_inner().map_err(|e| ForagerError::Persistence {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        tmp.persist(&self.path)
            .map_err(|e| ForagerError::Persistence {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(urls: &[&str]) -> Vec<WorkItem> {
        urls.iter().map(|u| WorkItem::new(*u)).collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UrlStore::new(dir.path().join("urls.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_merge_appends_only_new_urls_in_discovery_order() {
        let existing = items(&["a", "b"]);
        let discovered = items(&["b", "c", "d"]);

        let merged = UrlStore::merge(&existing, &discovered);

        let urls: Vec<&str> = merged.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_merge_length_law() {
        let existing = items(&["a", "b", "c"]);
        let discovered = items(&["b", "d", "e", "a"]);

        let merged = UrlStore::merge(&existing, &discovered);

        // len == existing + discovered urls not in existing
        assert_eq!(merged.len(), 3 + 2);

        let unique: HashSet<&str> = merged.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(unique.len(), merged.len());
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let existing = items(&["a"]);
        let discovered = items(&["b"]);

        let _ = UrlStore::merge(&existing, &discovered);

        assert_eq!(existing.len(), 1);
        assert_eq!(discovered.len(), 1);
    }

    #[test]
    fn test_merge_dedupes_within_discovered() {
        let merged = UrlStore::merge(&[], &items(&["a", "a", "b"]));
        let urls: Vec<&str> = merged.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
    }

    #[test]
    fn test_save_load_round_trip_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = UrlStore::new(dir.path().join("urls.csv"));

        let mut item = WorkItem::new("https://vkusvill.ru/goods/syrniki.html");
        item.metadata.insert("category".into(), "gotovaya-eda".into());
        let saved = vec![item, WorkItem::new("https://vkusvill.ru/goods/borshch.html")];

        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), saved);
    }

    #[test]
    fn test_save_dedupes_by_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let store = UrlStore::new(dir.path().join("urls.csv"));

        let mut first = WorkItem::new("a");
        first.metadata.insert("page".into(), "1".into());
        let mut dup = WorkItem::new("a");
        dup.metadata.insert("page".into(), "2".into());

        store.save(&[first.clone(), dup]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![first]);
    }
}
