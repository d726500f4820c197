use std::collections::{HashMap, HashSet};

use crate::domain::Record;

/// Replace-by-url merge of two record sequences.
///
/// Every url from `incoming` wins entirely over any existing record with
/// the same key (no field-level blending: freshly parsed data replaces
/// stale data wholesale). Existing records keep their positions, with
/// replaced ones rewritten in place; incoming records with new urls are
/// appended in incoming order. Pure and total: it never fails regardless
/// of input shape, and running it twice with the same `incoming` changes
/// nothing.
pub fn merge_records(existing: &[Record], incoming: &[Record]) -> Vec<Record> {
    let mut replacements: HashMap<&str, &Record> = HashMap::new();
    for record in incoming {
        // A url duplicated within `incoming` resolves to its last parse.
        replacements.insert(record.url.as_str(), record);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len());

    for record in existing {
        if !seen.insert(record.url.as_str()) {
            continue;
        }
        match replacements.get(record.url.as_str()) {
            Some(replacement) => merged.push((*replacement).clone()),
            None => merged.push(record.clone()),
        }
    }

    for record in incoming {
        if seen.insert(record.url.as_str()) {
            merged.push(replacements[record.url.as_str()].clone());
        }
    }

    merged
}
