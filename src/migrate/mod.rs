//! Dataset publication: copy per-category `_detailed.csv` files into the
//! directory that powers the web interface, under each shop's display
//! name, with a timestamped backup taken first.
//!
//! The category-to-file-name translation lives in per-shop mapping files
//! (`category_name,migrated_csv_name`); a missing source table is a
//! warning, not an error, so one broken category never blocks the rest.

use std::path::Path;

use crate::app::{ForagerError, Result};
use crate::config::MigrateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateMode {
    /// Wipe the published dataset and rebuild it from scraper output.
    Replace,
    /// Only overwrite files that are already published.
    Update,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateReport {
    pub copied: usize,
    pub skipped: usize,
    pub missing: usize,
}

pub fn run(config: &MigrateConfig, mode: MigrateMode) -> Result<MigrateReport> {
    backup(config)?;

    match mode {
        MigrateMode::Replace => replace(config),
        MigrateMode::Update => update(config),
    }
}

/// Copy the published dataset aside before touching it.
fn backup(config: &MigrateConfig) -> Result<()> {
    if !config.publish_dir.exists() {
        tracing::warn!(
            "Publish directory {} does not exist, nothing to back up",
            config.publish_dir.display()
        );
        return Ok(());
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = config.backup_dir.join(format!("backup_{timestamp}"));
    tracing::info!("Creating backup {}", backup_path.display());
    copy_tree(&config.publish_dir, &backup_path)?;
    Ok(())
}

fn replace(config: &MigrateConfig) -> Result<MigrateReport> {
    if config.publish_dir.exists() {
        tracing::info!(
            "Removing old publish directory {}",
            config.publish_dir.display()
        );
        std::fs::remove_dir_all(&config.publish_dir)?;
    }
    std::fs::create_dir_all(&config.publish_dir)?;

    copy_shops(config, false)
}

fn update(config: &MigrateConfig) -> Result<MigrateReport> {
    if !config.publish_dir.exists() {
        return Err(ForagerError::Config(format!(
            "publish directory {} does not exist, cannot update",
            config.publish_dir.display()
        )));
    }

    copy_shops(config, true)
}

fn copy_shops(config: &MigrateConfig, only_existing: bool) -> Result<MigrateReport> {
    let mut report = MigrateReport::default();

    for shop in &config.shops {
        let mapping = load_mapping(&shop.mapping)?;
        let shop_dir = config.publish_dir.join(&shop.display);

        for (slug, display_name) in mapping {
            let dst = shop_dir.join(format!("{display_name}.csv"));
            if only_existing && !dst.exists() {
                report.skipped += 1;
                continue;
            }

            let src = shop
                .data_dir
                .join(&slug)
                .join(format!("{slug}_detailed.csv"));
            if !src.exists() {
                tracing::warn!("Source file missing: {}", src.display());
                report.missing += 1;
                continue;
            }

            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dst)?;
            tracing::info!("Copied {} -> {}", src.display(), dst.display());
            report.copied += 1;
        }
    }

    Ok(report)
}

/// Mapping file: slug -> published file name. The header is validated
/// strictly so a reshuffled file fails loudly instead of publishing
/// under wrong names.
pub fn load_mapping(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?;
    let expected = ["category_name", "migrated_csv_name"];
    if headers.iter().collect::<Vec<_>>() != expected {
        return Err(ForagerError::Config(format!(
            "unexpected header in {}: {:?}, expected {:?}",
            path.display(),
            headers,
            expected
        )));
    }

    let mut mapping = Vec::new();
    for row in reader.records() {
        let row = row?;
        let slug = row.get(0).unwrap_or("").trim().to_string();
        let display = row.get(1).unwrap_or("").trim().to_string();
        if slug.is_empty() || display.is_empty() {
            continue;
        }
        mapping.push((slug, display));
    }

    Ok(mapping)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::ShopTarget;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(root: &Path) -> MigrateConfig {
        MigrateConfig {
            publish_dir: root.join("csv"),
            backup_dir: root.join("backups"),
            shops: vec![ShopTarget {
                code: "vkusvill".into(),
                display: "Вкусвилл".into(),
                data_dir: root.join("data"),
                mapping: root.join("vkusvill_cfg.csv"),
            }],
        }
    }

    fn seed(root: &Path) -> MigrateConfig {
        let config = config(root);
        write(
            &config.shops[0].mapping,
            "category_name,migrated_csv_name\ngotovaya-eda,Готовая еда\nhleb,\"Хлеб,выпечка\"\n",
        );
        write(
            &root.join("data/gotovaya-eda/gotovaya-eda_detailed.csv"),
            "url,name\nhttps://x/1,Сырники\n",
        );
        // hleb has no scraper output yet.
        config
    }

    #[test]
    fn test_load_mapping_validates_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.csv");
        write(&path, "wrong,header\na,b\n");

        let err = load_mapping(&path).unwrap_err();
        assert!(matches!(err, ForagerError::Config(_)));
    }

    #[test]
    fn test_load_mapping_skips_incomplete_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.csv");
        write(
            &path,
            "category_name,migrated_csv_name\ngotovaya-eda,Готовая еда\n,missing-slug\n",
        );

        let mapping = load_mapping(&path).unwrap();
        assert_eq!(mapping, vec![("gotovaya-eda".into(), "Готовая еда".into())]);
    }

    #[test]
    fn test_replace_builds_dataset_and_counts_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = seed(dir.path());

        let report = run(&config, MigrateMode::Replace).unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.missing, 1);
        let published = config.publish_dir.join("Вкусвилл/Готовая еда.csv");
        assert!(published.exists());
    }

    #[test]
    fn test_update_only_touches_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = seed(dir.path());

        // Nothing published yet: update copies nothing.
        std::fs::create_dir_all(&config.publish_dir).unwrap();
        let report = run(&config, MigrateMode::Update).unwrap();
        assert_eq!(report.copied, 0);
        assert_eq!(report.skipped, 2);

        // Publish once, then update refreshes it.
        run(&config, MigrateMode::Replace).unwrap();
        write(
            &dir.path().join("data/gotovaya-eda/gotovaya-eda_detailed.csv"),
            "url,name\nhttps://x/1,Борщ\n",
        );
        let report = run(&config, MigrateMode::Update).unwrap();
        assert_eq!(report.copied, 1);

        let published = std::fs::read_to_string(config.publish_dir.join("Вкусвилл/Готовая еда.csv"))
            .unwrap();
        assert!(published.contains("Борщ"));
    }

    #[test]
    fn test_update_without_dataset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = seed(dir.path());

        let err = run(&config, MigrateMode::Update).unwrap_err();
        assert!(matches!(err, ForagerError::Config(_)));
    }

    #[test]
    fn test_backup_snapshots_previous_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let config = seed(dir.path());

        run(&config, MigrateMode::Replace).unwrap();
        run(&config, MigrateMode::Replace).unwrap();

        let backups: Vec<PathBuf> = std::fs::read_dir(&config.backup_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0]
            .join("Вкусвилл/Готовая еда.csv")
            .exists());
    }
}
