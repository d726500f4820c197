use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::app::{ForagerError, Result};
use crate::domain::Record;

/// The persisted table: one CSV file, one row per record, keyed by url.
///
/// Header = `url` followed by the sorted union of all field keys; absent
/// fields are written as empty cells and dropped again on load. The file
/// is rewritten wholesale through a temp file in the same directory, so a
/// crashed run leaves the previous table intact.
pub struct CsvTable {
    path: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all records. A missing file is an empty table, as is a file
    /// with no rows.
    pub fn load(&self) -> Result<Vec<Record>> {
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

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let url = row.get(url_idx).unwrap_or("").to_string();
            if url.is_empty() {
                continue;
            }

            let mut record = Record::new(url);
            for (idx, cell) in row.iter().enumerate() {
                if idx == url_idx || cell.is_empty() {
                    continue;
                }
                if let Some(key) = headers.get(idx) {
                    record.set(key, cell);
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Rewrite the table atomically: temp file in the target directory,
    /// then rename over the old file.
    pub fn save(&self, records: &[Record]) -> Result<()> {
        let columns: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| record.fields.keys().map(String::as_str))
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

        for record in records {
            let mut row = vec![record.url.as_str()];
            row.extend(columns.iter().map(|&key| record.get_or_empty(key)));
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

    fn record(url: &str, fields: &[(&str, &str)]) -> Record {
        let mut record = Record::new(url);
        for (key, value) in fields {
            record.set(*key, *value);
        }
        record
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvTable::new(dir.path().join("absent.csv"));
        assert_eq!(table.load().unwrap(), Vec::new());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvTable::new(dir.path().join("detailed.csv"));

        let records = vec![
            record(
                "https://vkusvill.ru/goods/syrniki.html",
                &[("name", "Сырники"), ("price", "129"), ("weight", "300")],
            ),
            record(
                "https://vkusvill.ru/goods/borshch.html",
                &[("name", "Борщ, 350 г"), ("availability", "3")],
            ),
        ];
        table.save(&records).unwrap();

        let loaded = table.load().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_header_is_url_then_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detailed.csv");
        let table = CsvTable::new(&path);

        table
            .save(&[
                record("a", &[("weight", "1"), ("calories", "2")]),
                record("b", &[("name", "x")]),
            ])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, "url,calories,name,weight");
    }

    #[test]
    fn test_absent_fields_are_empty_cells_and_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvTable::new(dir.path().join("detailed.csv"));

        table
            .save(&[record("a", &[("name", "x")]), record("b", &[("price", "5")])])
            .unwrap();

        let loaded = table.load().unwrap();
        assert_eq!(loaded[0].get("price"), None);
        assert_eq!(loaded[1].get("name"), None);
    }

    #[test]
    fn test_quoted_and_utf8_values_survive() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvTable::new(dir.path().join("detailed.csv"));

        let records = vec![record(
            "https://www.ozon.ru/product/kasha-1/",
            &[
                ("content", "горох, вода, \"бекон\", соль"),
                ("description", "Каша\nс колбасками"),
            ],
        )];
        table.save(&records).unwrap();

        assert_eq!(table.load().unwrap(), records);
    }

    #[test]
    fn test_save_overwrites_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvTable::new(dir.path().join("detailed.csv"));

        table.save(&[record("a", &[("name", "old")])]).unwrap();
        table.save(&[record("a", &[("name", "new")])]).unwrap();

        let loaded = table.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].get("name"), Some("new"));
    }

    #[test]
    fn test_table_without_url_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "name,price\nx,5\n").unwrap();

        let err = CsvTable::new(&path).load().unwrap_err();
        assert!(matches!(err, ForagerError::MissingUrlColumn(_)));
    }
}
