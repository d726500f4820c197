use std::path::Path;
use std::sync::Arc;

use crate::app::{AppContext, ForagerError, Result};
use crate::enrich::{enrich_table, DerivedMetrics};
use crate::extract::{self, fields};
use crate::migrate::MigrateMode;
use crate::pipeline::{self, RunOptions};
use crate::sites::site_for;

pub async fn scrape(ctx: &AppContext, category_url: &str, opts: &RunOptions) -> Result<()> {
    let report = pipeline::run_category(ctx, category_url, opts).await?;

    println!(
        "Scrape complete: {} fetched, {} failed, {} parsed, {} records in table",
        report.fetched.succeeded, report.fetched.failed, report.parsed, report.total_records
    );
    Ok(())
}

/// Single-product mode: fetch, extract, print the flat record as JSON.
/// A fetch failure becomes an error-flagged record rather than a crash.
pub async fn product(ctx: &AppContext, url: &str) -> Result<()> {
    let site = site_for(url)?;
    let fetcher = site.product_fetcher(ctx.fetcher.clone());

    let record = match fetcher.fetch(url).await {
        Ok(raw) => site.extractor().extract(&raw, url),
        Err(err) => {
            let mut record = extract::base_record(url);
            record.set(fields::FETCH_ERR, err.to_string());
            extract::stamp(&mut record);
            record
        }
    };

    println!("{}", serde_json::to_string_pretty(&record.to_json())?);
    Ok(())
}

pub async fn check(ctx: &AppContext, csv: &Path, output: Option<&Path>) -> Result<()> {
    let report = pipeline::check_availability(ctx, csv, output).await?;

    println!(
        "Check complete: {} checked, {} failed, {} records",
        report.checked.succeeded, report.checked.failed, report.total_records
    );
    Ok(())
}

pub async fn enrich(ctx: &AppContext, csv: &Path, output: Option<&Path>) -> Result<()> {
    let report = enrich_table(ctx, Arc::new(DerivedMetrics), csv, output).await?;

    println!(
        "Enrichment complete: {} records written to {}",
        report.enriched,
        report.output.display()
    );
    Ok(())
}

pub fn migrate(ctx: &AppContext, replace: bool, update: bool) -> Result<()> {
    let mode = match (replace, update) {
        (true, false) => MigrateMode::Replace,
        (false, true) => MigrateMode::Update,
        _ => {
            return Err(ForagerError::Config(
                "pass exactly one of --replace or --update".into(),
            ))
        }
    };

    let report = crate::migrate::run(&ctx.config.migrate, mode)?;

    println!(
        "Migration complete: {} copied, {} skipped, {} missing",
        report.copied, report.skipped, report.missing
    );
    Ok(())
}
