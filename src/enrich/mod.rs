//! Table enrichment: run every record through an enricher under the
//! bounded mapping pool and merge the widened records back by url.
//!
//! The enricher is a seam: the built-in one recomputes the derived
//! metric columns; heavier analysis backends plug in behind the same
//! trait without touching the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::{AppContext, ForagerError, Result};
use crate::domain::Record;
use crate::extract;
use crate::fetcher::parallel::map_bounded;
use crate::store::{merge_records, CsvTable};

pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the record with its enrichment columns added or refreshed.
    /// Must be total: a record it cannot improve comes back unchanged.
    fn enrich(&self, record: &Record) -> Record;
}

/// Recomputes `pro/cal` and `pri/we` from the macro, price and weight
/// columns.
pub struct DerivedMetrics;

impl Enricher for DerivedMetrics {
    fn name(&self) -> &'static str {
        "derived-metrics"
    }

    fn enrich(&self, record: &Record) -> Record {
        let mut enriched = record.clone();
        extract::derived_metrics(&mut enriched);
        enriched
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichReport {
    pub enriched: usize,
    pub output: PathBuf,
}

/// Default output path: `<stem>_enriched.csv` next to the input.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "table".to_string());
    input.with_file_name(format!("{stem}_enriched.csv"))
}

pub async fn enrich_table(
    app: &AppContext,
    enricher: Arc<dyn Enricher>,
    csv_path: &Path,
    output: Option<&Path>,
) -> Result<EnrichReport> {
    let table = CsvTable::new(csv_path);
    if !table.exists() {
        return Err(ForagerError::TableNotFound(csv_path.to_path_buf()));
    }
    let records = table.load()?;
    tracing::info!(
        "Loaded {} records from {} for {} enrichment",
        records.len(),
        csv_path.display(),
        enricher.name()
    );

    let mut enriched: Vec<Record> = Vec::new();
    let map = {
        let enricher = enricher.clone();
        move |record: Record| enricher.enrich(&record)
    };
    map_bounded(
        records.clone(),
        app.config.workers.max(1),
        &app.run,
        map,
        |record| enriched.push(record),
    )
    .await;

    let merged = merge_records(&records, &enriched);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(csv_path));
    CsvTable::new(&output).save(&merged)?;

    Ok(EnrichReport {
        enriched: merged.len(),
        output,
    })
}
