use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::app::Result;

/// Maximum slug length kept in a snapshot file name.
const MAX_SLUG_LEN: usize = 100;

/// Raw-page cache for one category: each fetched payload is stored under
/// a file name derived from the product URL, so re-runs skip everything
/// already on disk.
pub struct SnapshotStore {
    dir: PathBuf,
    ext: &'static str,
}

impl SnapshotStore {
    /// Open (and create if needed) the snapshot directory. `ext` is the
    /// payload extension without the dot, e.g. "html" or "json".
    pub fn new(dir: impl Into<PathBuf>, ext: &'static str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, ext })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file name for a product URL: the last path segment,
    /// sanitized and length-capped. URLs without a usable slug fall back
    /// to the hex digest of the whole URL.
    pub fn file_name(&self, url: &str) -> String {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let slug = without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .trim_end_matches(".html");

        let safe: String = slug
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_SLUG_LEN)
            .collect();

        if safe.chars().all(|c| c == '_' || c == '.') {
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            return format!("{}.{}", hex::encode(hasher.finalize()), self.ext);
        }

        format!("{}.{}", safe, self.ext)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.dir.join(self.file_name(url)).exists()
    }

    pub fn save(&self, url: &str, content: &str) -> Result<()> {
        let path = self.dir.join(self.file_name(url));
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(&self, file_name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.dir.join(file_name))?)
    }

    /// Snapshot file names currently on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(&format!(".{}", self.ext)) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("pages"), "html").unwrap();
        (dir, store)
    }

    #[test]
    fn test_file_name_uses_url_slug() {
        let (_dir, store) = store();
        assert_eq!(
            store.file_name("https://vkusvill.ru/goods/syrniki-s-izyumom.html"),
            "syrniki-s-izyumom.html"
        );
        assert_eq!(
            store.file_name("https://www.ozon.ru/product/kasha-200-g-123456/"),
            "kasha-200-g-123456.html"
        );
    }

    #[test]
    fn test_file_name_strips_query_and_fragment() {
        let (_dir, store) = store();
        assert_eq!(
            store.file_name("https://vkusvill.ru/goods/borshch.html?utm=x#top"),
            "borshch.html"
        );
    }

    #[test]
    fn test_file_name_sanitizes_odd_characters() {
        let (_dir, store) = store();
        let name = store.file_name("https://example.com/товар и пробелы");
        assert!(name.ends_with(".html"));
        assert!(name
            .trim_end_matches(".html")
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
    }

    #[test]
    fn test_degenerate_slug_falls_back_to_digest() {
        let (_dir, store) = store();
        let name = store.file_name("https://example.com/...");
        // sha256 hex + extension
        assert_eq!(name.len(), 64 + ".html".len());
    }

    #[test]
    fn test_save_contains_load_round_trip() {
        let (_dir, store) = store();
        let url = "https://vkusvill.ru/goods/syrniki.html";

        assert!(!store.contains(url));
        store.save(url, "<html>Сырники</html>").unwrap();
        assert!(store.contains(url));

        let loaded = store.load(&store.file_name(url)).unwrap();
        assert_eq!(loaded, "<html>Сырники</html>");
    }

    #[test]
    fn test_list_returns_sorted_snapshot_names() {
        let (_dir, store) = store();
        store.save("https://x/b-item", "b").unwrap();
        store.save("https://x/a-item", "a").unwrap();

        assert_eq!(store.list().unwrap(), vec!["a-item.html", "b-item.html"]);
    }
}
