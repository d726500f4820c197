//! The category run: prepare work items, fetch missing snapshots under
//! the bounded scheduler, parse what is new, merge by url, rewrite the
//! table atomically.
//!
//! Per-item fetch and extract failures are absorbed here (the batch
//! always finishes); only the final table write is allowed to abort the
//! run.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::app::{AppContext, ForagerError, Result};
use crate::domain::{Record, WorkItem};
use crate::extract::{self, fields, FieldExtractor};
use crate::fetcher::parallel::{map_bounded, BatchSummary};
use crate::sites::site_for;
use crate::store::{merge_records, CsvTable, SnapshotStore, UrlStore};

/// Per-run switches of the `scrape` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub generate_urls: bool,
    pub update_urls: bool,
    pub force_refetch: bool,
    pub force_reparse: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    pub fetched: BatchSummary,
    pub parsed: usize,
    pub total_records: usize,
}

/// One line per processed item, flushed immediately so a downstream
/// consumer can follow along without waiting for the run to finish.
pub fn emit_progress(url: &str, code: &str) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{url} {code}");
    let _ = out.flush();
}

fn parse_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

pub async fn run_category(
    app: &AppContext,
    category_url: &str,
    opts: &RunOptions,
) -> Result<RunReport> {
    let started = Instant::now();

    let site = site_for(category_url)?;
    let slug = site.category_slug(category_url)?;
    tracing::info!("Starting extraction for category {} ({})", slug, site.name());

    let category_dir = app.config.data_dir.join(&slug);
    let url_store = UrlStore::new(category_dir.join(format!("{slug}_product_urls.csv")));
    let table = CsvTable::new(category_dir.join(format!("{slug}_detailed.csv")));
    let snapshots = SnapshotStore::new(category_dir.join("pages"), site.snapshot_ext())?;

    // STEP 1: prepare work items.
    let existing_items = url_store.load()?;
    let items: Vec<WorkItem> = if opts.generate_urls || existing_items.is_empty() {
        tracing::info!("Generating product URLs from the website");
        let discovered = site
            .discover(app.fetcher.clone(), &app.scheduler, &app.run, category_url)
            .await?;
        if !discovered.is_empty() {
            url_store.save(&discovered)?;
            tracing::info!(
                "Saved {} product URLs to {}",
                discovered.len(),
                url_store.path().display()
            );
        }
        discovered
    } else if opts.update_urls {
        tracing::info!("Updating existing product URLs");
        let discovered = site
            .discover(app.fetcher.clone(), &app.scheduler, &app.run, category_url)
            .await?;
        let merged = UrlStore::merge(&existing_items, &discovered);
        tracing::info!(
            "Found {} new product URLs",
            merged.len() - existing_items.len()
        );
        url_store.save(&merged)?;
        merged
    } else {
        tracing::info!(
            "Found {} existing products in {}",
            existing_items.len(),
            url_store.path().display()
        );
        existing_items
    };

    if items.is_empty() {
        tracing::error!("Nothing to do; re-run with --generate-urls to walk the category");
        return Err(ForagerError::EmptyUrlTable(url_store.path().to_path_buf()));
    }

    // STEP 2: fetch snapshots that are missing (or all of them under
    // --force-refetch).
    let to_fetch: Vec<String> = items
        .iter()
        .filter(|item| opts.force_refetch || !snapshots.contains(&item.url))
        .map(|item| item.url.clone())
        .collect();
    tracing::info!("Found {} new URLs to fetch", to_fetch.len());

    let product_fetcher = site.product_fetcher(app.fetcher.clone());
    let mut error_records: Vec<Record> = Vec::new();
    let fetched = app
        .scheduler
        .run(to_fetch, product_fetcher, &app.run, |result| {
            emit_progress(&result.url, &result.code());
            match (&result.payload, &result.error) {
                (Some(payload), _) => {
                    if let Err(e) = snapshots.save(&result.url, payload) {
                        tracing::error!("Failed to store snapshot for {}: {}", result.url, e);
                    }
                }
                (None, error) => {
                    let mut record = extract::base_record(&result.url);
                    let message = error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "fetch failed".into());
                    record.set(fields::FETCH_ERR, message);
                    extract::stamp(&mut record);
                    error_records.push(record);
                }
            }
        })
        .await;

    // STEP 3: parse snapshots that the table has not seen yet (or all of
    // them under --force-reparse).
    let existing_records = table.load()?;
    let parsed_paths: HashSet<&str> = existing_records
        .iter()
        .filter_map(|record| record.get(fields::HTML_PATH))
        .filter(|path| !path.is_empty())
        .collect();

    let mut to_parse: Vec<(String, String)> = Vec::new();
    for item in &items {
        if !snapshots.contains(&item.url) {
            continue;
        }
        let file_name = snapshots.file_name(&item.url);
        if !opts.force_reparse && parsed_paths.contains(file_name.as_str()) {
            continue;
        }
        to_parse.push((item.url.clone(), file_name));
    }
    tracing::info!(
        "Found {} snapshots to parse (out of {} items)",
        to_parse.len(),
        items.len()
    );

    let mut parsed_records: Vec<Record> = Vec::new();
    let parser = snapshot_parser(site.extractor(), snapshots.dir().to_path_buf());
    map_bounded(to_parse, parse_workers(), &app.run, parser, |record| {
        parsed_records.push(record)
    })
    .await;
    let parsed = parsed_records.len();

    // STEP 4: merge and persist. A fetch failure only earns an
    // error-flagged row when the url has no data at all; stale data beats
    // an error stub.
    let known: HashSet<&str> = existing_records
        .iter()
        .chain(parsed_records.iter())
        .map(|record| record.url.as_str())
        .collect();
    let fresh_errors: Vec<Record> = error_records
        .into_iter()
        .filter(|record| !known.contains(record.url.as_str()))
        .collect();

    let mut incoming = parsed_records;
    incoming.extend(fresh_errors);
    let merged = merge_records(&existing_records, &incoming);
    table.save(&merged)?;

    tracing::info!(
        "Extraction took {:.2} seconds; table {} now holds {} records",
        started.elapsed().as_secs_f64(),
        table.path().display(),
        merged.len()
    );

    Ok(RunReport {
        fetched,
        parsed,
        total_records: merged.len(),
    })
}

/// The CPU-bound mapping step handed to the bounded parse pool.
fn snapshot_parser(
    extractor: std::sync::Arc<dyn FieldExtractor>,
    snapshot_dir: std::path::PathBuf,
) -> impl Fn((String, String)) -> Record + Send + Sync + 'static {
    move |(url, file_name)| {
        let content = match std::fs::read_to_string(snapshot_dir.join(&file_name)) {
            Ok(content) => content,
            Err(e) => {
                let mut record = extract::base_record(&url);
                record.set(fields::FETCH_ERR, format!("snapshot read failed: {e}"));
                extract::stamp(&mut record);
                return record;
            }
        };

        let mut record = extractor.extract(&content, &url);
        record.set(fields::HTML_PATH, file_name);
        record
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckReport {
    pub checked: BatchSummary,
    pub total_records: usize,
}

/// Availability sweep over an existing table: fetch every url, read the
/// availability field out of the fresh parse, print `<url> <0|1>` per
/// item and rewrite the table (or `output`) with availability and
/// timestamp updated.
pub async fn check_availability(
    app: &AppContext,
    csv_path: &Path,
    output: Option<&Path>,
) -> Result<CheckReport> {
    let table = CsvTable::new(csv_path);
    if !table.exists() {
        return Err(ForagerError::TableNotFound(csv_path.to_path_buf()));
    }

    let records = table.load()?;
    if records.is_empty() {
        return Err(ForagerError::EmptyUrlTable(csv_path.to_path_buf()));
    }

    let site = site_for(&records[0].url)?;
    let fetcher = site.product_fetcher(app.fetcher.clone());
    let extractor = site.extractor();

    let position: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(idx, record)| (record.url.as_str(), idx))
        .collect();
    let urls: Vec<String> = records.iter().map(|record| record.url.clone()).collect();

    let mut updated: Vec<Record> = Vec::new();
    let checked = app
        .scheduler
        .run(urls, fetcher, &app.run, |result| {
            let availability = result
                .payload
                .as_deref()
                .map(|raw| {
                    let parsed = extractor.extract(raw, &result.url);
                    let value = parsed.get_or_empty(fields::AVAILABILITY).to_string();
                    if value.is_empty() {
                        "0".to_string()
                    } else {
                        value
                    }
                })
                .unwrap_or_else(|| "0".to_string());

            emit_progress(&result.url, &availability);

            if let Some(idx) = position.get(result.url.as_str()) {
                let mut record = records[*idx].clone();
                record.set(fields::AVAILABILITY, availability);
                extract::stamp(&mut record);
                updated.push(record);
            }
        })
        .await;

    let merged = merge_records(&records, &updated);
    let target = output
        .map(CsvTable::new)
        .unwrap_or_else(|| CsvTable::new(csv_path));
    target.save(&merged)?;

    Ok(CheckReport {
        checked,
        total_records: merged.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::app::RunContext;
    use crate::config::Config;
    use crate::fetcher::{FetchError, PageFetcher};
    use crate::session::Session;

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::Timeout)
        }
    }

    fn app_with(pages: HashMap<String, String>, data_dir: &Path) -> AppContext {
        let config = Config {
            data_dir: data_dir.to_path_buf(),
            workers: 3,
            ..Config::default()
        };
        AppContext::new(config, Session::empty(), RunContext::new(false))
            .unwrap()
            .with_fetcher(Arc::new(MapFetcher { pages }))
    }

    fn vkusvill_product(name: &str, quantity: u32) -> String {
        format!(
            r#"<html><body>
<h1 class="Product__title">{name}</h1>
<div class="ProductCard__weight">300 г</div>
<meta itemprop="price" content="129">
<div class="ProductLkRest" id="product-quantity-block" data-quantity="{quantity}">В наличии {quantity} шт</div>
</body></html>"#
        )
    }

    const CATEGORY: &str = "https://vkusvill.ru/goods/gotovaya-eda/";

    fn listing_fixture() -> HashMap<String, String> {
        let mut pages = HashMap::new();
        pages.insert(
            crate::extract::vkusvill::page_url(CATEGORY, 1),
            r#"<div class="ProductCards__item"><a class="js-product-detail-link" href="/goods/one.html">1</a></div>
<div class="ProductCards__item"><a class="js-product-detail-link" href="/goods/two.html">2</a></div>
<div class="ProductCards__item"><a class="js-product-detail-link" href="/goods/three.html">3</a></div>"#
                .to_string(),
        );
        pages.insert(
            "https://vkusvill.ru/goods/one.html".to_string(),
            vkusvill_product("Сырники", 3),
        );
        // two.html intentionally missing: its fetch times out.
        pages.insert(
            "https://vkusvill.ru/goods/three.html".to_string(),
            vkusvill_product("Борщ", 1),
        );
        pages
    }

    #[tokio::test]
    async fn test_run_category_end_to_end_with_one_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(listing_fixture(), dir.path());

        let report = run_category(
            &app,
            CATEGORY,
            &RunOptions {
                generate_urls: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(report.fetched.succeeded, 2);
        assert_eq!(report.fetched.failed, 1);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.total_records, 3);

        let table = CsvTable::new(dir.path().join("gotovaya-eda/gotovaya-eda_detailed.csv"));
        let records = table.load().unwrap();
        assert_eq!(records.len(), 3);

        let by_url: HashMap<&str, &Record> =
            records.iter().map(|r| (r.url.as_str(), r)).collect();
        assert_eq!(
            by_url["https://vkusvill.ru/goods/one.html"].get(fields::NAME),
            Some("Сырники")
        );
        // The failed fetch is recorded as an error-flagged row.
        let failed = by_url["https://vkusvill.ru/goods/two.html"];
        assert!(!failed.get_or_empty(fields::FETCH_ERR).is_empty());
        assert_eq!(failed.get(fields::NAME), None);
    }

    #[tokio::test]
    async fn test_rerun_is_incremental_and_preserves_records() {
        let dir = tempfile::tempdir().unwrap();

        let first = app_with(listing_fixture(), dir.path());
        run_category(
            &first,
            CATEGORY,
            &RunOptions {
                generate_urls: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Second run: nothing reachable at all; snapshots and table carry it.
        let second = app_with(HashMap::new(), dir.path());
        let report = run_category(&second, CATEGORY, &RunOptions::default())
            .await
            .unwrap();

        // Snapshots for one+three exist, so only the failed url is retried.
        assert_eq!(report.fetched.total(), 1);
        assert_eq!(report.parsed, 0);
        assert_eq!(report.total_records, 3);

        let table = CsvTable::new(dir.path().join("gotovaya-eda/gotovaya-eda_detailed.csv"));
        let records = table.load().unwrap();
        let names: Vec<Option<&str>> =
            records.iter().map(|r| r.get(fields::NAME)).collect();
        assert!(names.contains(&Some("Сырники")));
        assert!(names.contains(&Some("Борщ")));
    }

    #[tokio::test]
    async fn test_scrape_without_urls_and_without_generate_fails() {
        let dir = tempfile::tempdir().unwrap();
        // Discovery finds an empty listing page.
        let mut pages = HashMap::new();
        pages.insert(
            crate::extract::vkusvill::page_url(CATEGORY, 1),
            "<html></html>".to_string(),
        );
        let app = app_with(pages, dir.path());

        let err = run_category(&app, CATEGORY, &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForagerError::EmptyUrlTable(_)));
    }

    #[tokio::test]
    async fn test_unknown_shop_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(HashMap::new(), dir.path());

        let err = run_category(&app, "https://example.com/shop/", &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForagerError::UnknownShop(_)));
    }

    #[tokio::test]
    async fn test_check_availability_updates_table_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("detailed.csv");

        let mut stale = Record::new("https://vkusvill.ru/goods/one.html");
        stale
            .set(fields::NAME, "Сырники")
            .set(fields::AVAILABILITY, "9");
        CsvTable::new(&csv_path).save(&[stale]).unwrap();

        let mut pages = HashMap::new();
        pages.insert(
            "https://vkusvill.ru/goods/one.html".to_string(),
            vkusvill_product("Сырники", 2),
        );
        let app = app_with(pages, dir.path());

        let report = check_availability(&app, &csv_path, None).await.unwrap();
        assert_eq!(report.checked.succeeded, 1);

        let records = CsvTable::new(&csv_path).load().unwrap();
        assert_eq!(records[0].get(fields::AVAILABILITY), Some("2"));
        // The rest of the row survives the availability sweep.
        assert_eq!(records[0].get(fields::NAME), Some("Сырники"));
    }

    #[tokio::test]
    async fn test_check_availability_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(HashMap::new(), dir.path());

        let err = check_availability(&app, &dir.path().join("absent.csv"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForagerError::TableNotFound(_)));
    }
}
