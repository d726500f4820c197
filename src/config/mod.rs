//! Configuration for the scraping pipeline.
//!
//! Read from `forager.toml` in the working directory (or the path given
//! with `--config`). A missing file means defaults; missing fields in an
//! existing file fall back to their defaults individually.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::{ForagerError, Result};
use crate::fetcher::parallel::DEFAULT_WORKERS;
use crate::fetcher::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "forager.toml";

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for per-category data (URL tables, snapshots,
    /// detailed tables).
    pub data_dir: PathBuf,

    /// Fetch worker count; overridable per run with `--workers`.
    pub workers: usize,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// User agent sent with every request.
    pub user_agent: String,

    /// Cookie bundle captured outside the pipeline.
    pub cookies_file: PathBuf,

    /// Origins that receive cookies which carry no domain of their own.
    pub cookie_origins: Vec<String>,

    pub retry: RetryPolicy,

    pub migrate: MigrateConfig,
}

/// Dataset publication targets for `forager migrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Directory that powers the web interface.
    pub publish_dir: PathBuf,

    /// Where timestamped backups of `publish_dir` go.
    pub backup_dir: PathBuf,

    pub shops: Vec<ShopTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopTarget {
    /// Shop code, e.g. "vkusvill".
    pub code: String,

    /// Display name used as the published folder, e.g. "Вкусвилл".
    pub display: String,

    /// Scraper output root holding `<slug>/<slug>_detailed.csv` files.
    pub data_dir: PathBuf,

    /// Mapping file with `category_name,migrated_csv_name` rows.
    pub mapping: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            workers: DEFAULT_WORKERS,
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            cookies_file: PathBuf::from("cookies.json"),
            cookie_origins: vec![
                "https://vkusvill.ru/".to_string(),
                "https://www.ozon.ru/".to_string(),
            ],
            retry: RetryPolicy::default(),
            migrate: MigrateConfig::default(),
        }
    }
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            publish_dir: PathBuf::from("csv"),
            backup_dir: PathBuf::from("backups"),
            shops: vec![
                ShopTarget {
                    code: "vkusvill".into(),
                    display: "Вкусвилл".into(),
                    data_dir: PathBuf::from("data"),
                    mapping: PathBuf::from("vkusvill_cfg.csv"),
                },
                ShopTarget {
                    code: "ozon".into(),
                    display: "Озон".into(),
                    data_dir: PathBuf::from("data"),
                    mapping: PathBuf::from("ozon_cfg.csv"),
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `forager.toml` when no
    /// path is given. A missing default file yields `Config::default()`;
    /// an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(ForagerError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ForagerError::Config(format!("{}: {}", path.display(), e)))?;

        Ok(config)
    }
}
