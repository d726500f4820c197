use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A unit of pending fetch work: one product URL plus whatever metadata
/// the listing walk attached to it. Identity is the `url`; metadata is
/// replaced wholesale on re-discovery, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(url: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            url: url.into(),
            metadata,
        }
    }
}
