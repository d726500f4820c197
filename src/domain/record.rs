use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One extracted row, keyed by product URL.
///
/// `fields` is an open mapping: a newer extractor may add columns between
/// runs and the CSV layer widens the header to the union of all keys.
/// Values are canonical decimal text for numbers and plain text otherwise;
/// an absent key reads as the empty string, and no distinction is made
/// between "missing" and "empty". `BTreeMap` keeps iteration in sorted key
/// order, which is also the persisted column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value with the documented default applied: absent means empty.
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Flat JSON view (`url` alongside the fields), the shape the
    /// single-product mode prints.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("url".into(), serde_json::Value::String(self.url.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(map)
    }
}
