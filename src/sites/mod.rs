//! Shop-specific wiring: how a category URL turns into a slug, how
//! product pages are fetched, and how listings are walked.
//!
//! VkusVill serves plain HTML with numbered pages; Ozon renders from an
//! internal JSON API with a `nextPage` cursor. Both end in the same
//! pipeline: WorkItems in, Records out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::app::{ForagerError, Result, RunContext};
use crate::domain::WorkItem;
use crate::extract::{ozon, vkusvill, FieldExtractor, OzonExtractor, VkusvillExtractor};
use crate::fetcher::parallel::FetchScheduler;
use crate::fetcher::{FetchError, PageFetcher};

pub const OZON_API_BASE: &str = "https://api.ozon.ru/entrypoint-api.bx/page/json/v2";

/// Hard stop for the Ozon category walk.
const MAX_CATEGORY_PAGES: usize = 322;

/// Politeness delay between Ozon category pages.
const PAGE_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Site: Send + Sync {
    fn name(&self) -> &'static str;

    /// Directory-friendly category slug derived from the category URL.
    fn category_slug(&self, category_url: &str) -> Result<String>;

    /// Wrap the transport fetcher with whatever this shop needs for
    /// product pages.
    fn product_fetcher(&self, base: Arc<dyn PageFetcher>) -> Arc<dyn PageFetcher>;

    /// Extension of the raw snapshots this shop produces.
    fn snapshot_ext(&self) -> &'static str;

    fn extractor(&self) -> Arc<dyn FieldExtractor>;

    /// Walk the category listing and return the discovered work items in
    /// listing order.
    async fn discover(
        &self,
        base: Arc<dyn PageFetcher>,
        scheduler: &FetchScheduler,
        ctx: &RunContext,
        category_url: &str,
    ) -> Result<Vec<WorkItem>>;
}

/// Pick the shop from the URL host.
pub fn site_for(url: &str) -> Result<Arc<dyn Site>> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().unwrap_or("");

    if host == "vkusvill.ru" || host.ends_with(".vkusvill.ru") {
        Ok(Arc::new(VkusvillSite))
    } else if host == "ozon.ru" || host.ends_with(".ozon.ru") {
        Ok(Arc::new(OzonSite))
    } else {
        Err(ForagerError::UnknownShop(url.to_string()))
    }
}

pub struct VkusvillSite;

#[async_trait]
impl Site for VkusvillSite {
    fn name(&self) -> &'static str {
        "vkusvill"
    }

    fn category_slug(&self, category_url: &str) -> Result<String> {
        let parsed = Url::parse(category_url)?;
        parsed
            .path_segments()
            .and_then(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .next_back()
                    .map(str::to_string)
            })
            .filter(|slug| !slug.is_empty())
            .ok_or_else(|| ForagerError::BadCategory(category_url.to_string()))
    }

    fn product_fetcher(&self, base: Arc<dyn PageFetcher>) -> Arc<dyn PageFetcher> {
        base
    }

    fn snapshot_ext(&self) -> &'static str {
        "html"
    }

    fn extractor(&self) -> Arc<dyn FieldExtractor> {
        Arc::new(VkusvillExtractor::default())
    }

    async fn discover(
        &self,
        base: Arc<dyn PageFetcher>,
        scheduler: &FetchScheduler,
        ctx: &RunContext,
        category_url: &str,
    ) -> Result<Vec<WorkItem>> {
        let first = base.fetch(&vkusvill::page_url(category_url, 1)).await?;
        let pages = vkusvill::total_pages(&first);
        tracing::info!("Total pages found: {}", pages);

        let mut by_page: Vec<(usize, Vec<WorkItem>)> = vec![(1, vkusvill::parse_listing(&first))];

        if pages > 1 {
            let page_urls: Vec<String> = (2..=pages)
                .map(|page| vkusvill::page_url(category_url, page))
                .collect();
            let page_of: HashMap<String, usize> = page_urls
                .iter()
                .enumerate()
                .map(|(idx, url)| (url.clone(), idx + 2))
                .collect();

            scheduler
                .run(page_urls, base.clone(), ctx, |result| {
                    match (&result.payload, page_of.get(&result.url)) {
                        (Some(body), Some(page)) => {
                            by_page.push((*page, vkusvill::parse_listing(body)));
                        }
                        _ => tracing::warn!(
                            "Failed to fetch listing page {}: {}",
                            result.url,
                            result.code()
                        ),
                    }
                })
                .await;
        }

        // Listing order is page order, not completion order.
        by_page.sort_by_key(|(page, _)| *page);
        let items: Vec<WorkItem> = by_page
            .into_iter()
            .flat_map(|(_, items)| items)
            .collect();
        tracing::info!("Total products found: {}", items.len());
        Ok(items)
    }
}

pub struct OzonSite;

impl OzonSite {
    fn category_id(category_url: &str) -> Result<String> {
        let parsed = Url::parse(category_url)?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            ["category", id, ..] | ["highlight", id, ..] => Ok((*id).to_string()),
            _ => Err(ForagerError::BadCategory(category_url.to_string())),
        }
    }
}

#[async_trait]
impl Site for OzonSite {
    fn name(&self) -> &'static str {
        "ozon"
    }

    /// Category id minus its numeric suffix:
    /// `supermarket-gotovye-blyuda-9521000` → `supermarket-gotovye-blyuda`.
    fn category_slug(&self, category_url: &str) -> Result<String> {
        let id = Self::category_id(category_url)?;
        let parts: Vec<&str> = id.split('-').collect();
        match parts.split_last() {
            Some((last, rest)) if !rest.is_empty() && last.chars().all(|c| c.is_ascii_digit()) => {
                Ok(rest.join("-"))
            }
            _ => Ok(id),
        }
    }

    fn product_fetcher(&self, base: Arc<dyn PageFetcher>) -> Arc<dyn PageFetcher> {
        Arc::new(OzonApiFetcher { inner: base })
    }

    fn snapshot_ext(&self) -> &'static str {
        "json"
    }

    fn extractor(&self) -> Arc<dyn FieldExtractor> {
        Arc::new(OzonExtractor::default())
    }

    async fn discover(
        &self,
        base: Arc<dyn PageFetcher>,
        _scheduler: &FetchScheduler,
        ctx: &RunContext,
        category_url: &str,
    ) -> Result<Vec<WorkItem>> {
        let category_id = Self::category_id(category_url)?;
        let mut path =
            format!("/category/{category_id}/?layout_container=categorySearchMegapagination");

        let mut items = Vec::new();
        for page in 1..=MAX_CATEGORY_PAGES {
            if ctx.is_cancelled() {
                break;
            }
            tracing::info!("Fetching category page {}", page);

            let raw = match base.fetch(&ozon_api_url(&path, page == 1)).await {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!("Error fetching page {}: {}", page, err);
                    break;
                }
            };

            let (page_items, next_page) = ozon::parse_listing_page(&raw);
            tracing::info!("Found {} products on page {}", page_items.len(), page);
            items.extend(page_items);

            let Some(next_page) = next_page else { break };
            path = next_page;
            tokio::time::sleep(PAGE_DELAY).await;
        }

        Ok(items)
    }
}

/// Entrypoint-API URL for a site-relative path (the path goes into the
/// `url` query parameter, percent-encoded).
pub fn ozon_api_url(path: &str, page_changed: bool) -> String {
    let mut api = Url::parse(OZON_API_BASE).expect("static base url");
    {
        let mut query = api.query_pairs_mut();
        query.append_pair("url", path);
        if page_changed {
            query.append_pair("page_changed", "true");
        }
    }
    api.to_string()
}

/// Product fetches go through the JSON API: the primary payload is
/// required, the second-column page (composition, weight) is merged in
/// on a best-effort basis.
struct OzonApiFetcher {
    inner: Arc<dyn PageFetcher>,
}

#[async_trait]
impl PageFetcher for OzonApiFetcher {
    async fn fetch(&self, product_url: &str) -> std::result::Result<String, FetchError> {
        let parsed =
            Url::parse(product_url).map_err(|e| FetchError::Transport(e.to_string()))?;
        let path = parsed.path();

        let primary_path = format!("{path}?oos_search=false&miniapp=supermarket");
        let raw = self.inner.fetch(&ozon_api_url(&primary_path, false)).await?;
        let mut data: Value = serde_json::from_str(&raw)
            .map_err(|_| FetchError::Transport("expected JSON from the entrypoint API".into()))?;

        let second_path = format!(
            "{path}?layout_container=pdpPage2column&layout_page_index=2&oos_search=false&miniapp=supermarket"
        );
        match self.inner.fetch(&ozon_api_url(&second_path, false)).await {
            Ok(raw2) => {
                if let Ok(page2) = serde_json::from_str::<Value>(&raw2) {
                    merge_widget_states(&mut data, &page2);
                }
            }
            Err(err) => {
                tracing::warn!("Error fetching extended description page: {}", err);
            }
        }

        Ok(data.to_string())
    }
}

fn merge_widget_states(primary: &mut Value, secondary: &Value) {
    let Some(extra) = secondary["widgetStates"].as_object() else {
        return;
    };
    if primary.get("widgetStates").map(|w| w.is_object()) != Some(true) {
        primary["widgetStates"] = Value::Object(serde_json::Map::new());
    }
    if let Some(widgets) = primary["widgetStates"].as_object_mut() {
        for (key, value) in extra {
            widgets.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
