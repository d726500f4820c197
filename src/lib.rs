//! # Forager
//!
//! A grocery-product scraping pipeline for VkusVill and Ozon Fresh.
//!
//! ## Architecture
//!
//! ```text
//! Site discovery → UrlStore → FetchScheduler → FieldExtractor → merge → CsvTable
//! ```
//!
//! Every category run is incremental: discovered URLs accumulate in a
//! CSV-backed work list, fetched pages are cached as snapshots, and
//! freshly extracted records replace their predecessors by url in the
//! persisted table, which is rewritten atomically at the end of the run.
//!
//! ## Quick Start
//!
//! ```bash
//! # Walk a category and build its table
//! forager scrape https://vkusvill.ru/goods/gotovaya-eda/ --generate-urls
//!
//! # Pick up newly listed products on a later day
//! forager scrape https://vkusvill.ru/goods/gotovaya-eda/ --update-urls
//!
//! # One product, as JSON
//! forager product https://vkusvill.ru/goods/syrniki.html
//!
//! # Availability sweep over an existing table
//! forager check data/gotovaya-eda/gotovaya-eda_detailed.csv
//! ```
//!
//! ## Modules
//!
//! - [`app`]: application wiring, run context and error types
//! - [`cli`]: command-line surface
//! - [`config`]: TOML configuration
//! - [`domain`]: core models ([`WorkItem`](domain::WorkItem), [`Record`](domain::Record))
//! - [`fetcher`]: HTTP fetching, retry policy, bounded scheduler
//! - [`extract`]: per-shop field extractors
//! - [`session`]: cookie bundle loading
//! - [`sites`]: shop detection, listing walks, fetch adapters
//! - [`store`]: URL store, CSV table, snapshots, record merging
//! - [`pipeline`]: the category run and the availability sweep
//! - [`enrich`]: derived-metric enrichment
//! - [`migrate`]: dataset publication

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires config, fetcher and scheduler;
/// [`RunContext`](app::RunContext) carries the cancellation flag.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration management (`forager.toml`).
pub mod config;

/// Core domain models.
pub mod domain;

/// Derived-metric enrichment over persisted tables.
pub mod enrich;

/// Per-shop field extraction with best-effort fallbacks.
pub mod extract;

/// HTTP fetching: [`PageFetcher`](fetcher::PageFetcher) trait,
/// reqwest implementation, uniform retry policy, and the bounded
/// [`FetchScheduler`](fetcher::parallel::FetchScheduler).
pub mod fetcher;

/// Dataset publication into the web-interface directory.
pub mod migrate;

/// The category run: prepare, fetch, parse, merge, persist.
pub mod pipeline;

/// Cookie bundle captured outside the pipeline.
pub mod session;

/// Shop-specific wiring (VkusVill, Ozon Fresh).
pub mod sites;

/// CSV persistence: URL store, record table, snapshots, merging.
pub mod store;
