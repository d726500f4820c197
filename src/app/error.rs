use std::path::PathBuf;

use thiserror::Error;

use crate::fetcher::FetchError;

#[derive(Error, Debug)]
pub enum ForagerError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write table {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not found: {0}")]
    TableNotFound(PathBuf),

    #[error("No shop known for URL: {0}")]
    UnknownShop(String),

    #[error("Cannot resolve category from URL: {0}")]
    BadCategory(String),

    #[error("No product URLs in {0}")]
    EmptyUrlTable(PathBuf),

    #[error("Table {0} has no url column")]
    MissingUrlColumn(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ForagerError>;
