pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "forager")]
#[command(about = "Grocery product scraping pipeline", long_about = None)]
pub struct Cli {
    /// Number of parallel fetch workers
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Only log errors (per-item progress lines still go to stdout)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: forager.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Cookie file captured outside the pipeline
    #[arg(long, global = true)]
    pub cookies: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape a category: discover URLs, fetch pages, extract, persist
    Scrape {
        /// Category URL (vkusvill.ru or ozon.ru)
        category_url: String,

        /// Re-walk the category listing and overwrite the URL table
        #[arg(long)]
        generate_urls: bool,

        /// Re-walk the listing and append newly found URLs
        #[arg(long)]
        update_urls: bool,

        /// Fetch every product page again even when a snapshot exists
        #[arg(long)]
        force_refetch: bool,

        /// Parse every snapshot again even when already in the table
        #[arg(long)]
        force_reparse: bool,
    },
    /// Fetch a single product and print the record as JSON
    Product {
        /// Product URL
        url: String,
    },
    /// Check availability for every URL in a table
    Check {
        /// Table with a url column
        csv: PathBuf,

        /// Write the updated table here instead of in place
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recompute derived metric columns for a table
    Enrich {
        /// Table with a url column
        csv: PathBuf,

        /// Output table (default: <stem>_enriched.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Publish per-category tables into the shared dataset directory
    Migrate {
        /// Rebuild the dataset from scratch
        #[arg(long, conflicts_with = "update")]
        replace: bool,

        /// Only overwrite files that are already published
        #[arg(long)]
        update: bool,
    },
}
