//! Ozon Fresh entrypoint-API payloads.
//!
//! Ozon renders from JSON: the interesting data sits in `widgetStates`,
//! a map of widget-id → JSON-encoded string, plus a JSON-LD block under
//! `seo.script`. The extractor works over one merged payload (the fetch
//! adapter folds the second-column page into the same `widgetStates`).

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{Record, WorkItem};
use crate::extract::{self, fields, FieldExtractor};

pub const BASE_URL: &str = "https://www.ozon.ru";

const IN_STOCK: &str = "http://schema.org/InStock";

/// Swappable out-of-stock rule over the JSON-LD product object.
pub type AvailabilityFn = Arc<dyn Fn(&Value) -> i64 + Send + Sync>;

pub struct OzonExtractor {
    availability: AvailabilityFn,
}

impl Default for OzonExtractor {
    fn default() -> Self {
        Self::new(Arc::new(default_availability))
    }
}

impl OzonExtractor {
    pub fn new(availability: AvailabilityFn) -> Self {
        Self { availability }
    }
}

/// Default rule: the JSON-LD offer must say the product is in stock.
pub fn default_availability(ld: &Value) -> i64 {
    if ld["offers"]["availability"].as_str() == Some(IN_STOCK) {
        1
    } else {
        0
    }
}

impl FieldExtractor for OzonExtractor {
    fn extract(&self, raw: &str, url: &str) -> Record {
        let mut record = extract::base_record(url);

        let Ok(data) = serde_json::from_str::<Value>(raw) else {
            record.set(fields::FETCH_ERR, "payload is not valid JSON");
            extract::stamp(&mut record);
            return record;
        };

        if let Some(heading) = widget_json(&data, "webProductHeading") {
            if let Some(title) = heading["title"].as_str() {
                record.set(fields::NAME, title);
            }
        }

        self.nutrition(&data, &mut record);

        // Category: tracking hierarchy first, breadcrumbs override.
        let mut category = data["layoutTrackingInfo"]
            .as_str()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|tracking| tracking["hierarchy"].as_str().map(str::to_string))
            .map(|hierarchy| hierarchy.replace('/', "#"))
            .unwrap_or_default();
        if let Some(crumbs) = widget_json(&data, "breadCrumbs") {
            let names: Vec<String> = crumbs["breadcrumbs"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|crumb| crumb["text"].as_str().unwrap_or("").to_string())
                .collect();
            if !names.is_empty() {
                category = names.join("#");
            }
        }
        record.set(fields::CATEGORY, category);

        if let Some(ld) = json_ld(&data) {
            let offers = &ld["offers"];
            if offers.is_object() {
                record.set(fields::PRICE, json_text(&offers["price"]));
                record.set(
                    fields::AVAILABILITY,
                    (self.availability)(&ld).to_string(),
                );
            }

            let rating = &ld["aggregateRating"];
            if rating.is_object() {
                record.set(fields::RATING, json_text(&rating["ratingValue"]));
                record.set(fields::RATING_COUNT, json_text(&rating["reviewCount"]));
            }

            record.set(fields::IMG_URL, json_text(&ld["image"]));

            if record.get_or_empty(fields::NAME).is_empty() {
                record.set(fields::NAME, json_text(&ld["name"]));
            }
            let description = json_text(&ld["description"]);
            if !description.is_empty() {
                record.set(fields::DESCRIPTION, description);
            }
        }

        // Second-column page widgets (merged into the same payload).
        if let Some(description) = widget_json(&data, "webDescription") {
            for item in description["characteristics"].as_array().into_iter().flatten() {
                let title = item["title"].as_str().unwrap_or("").to_lowercase();
                let content = item["content"].as_str().unwrap_or("").trim();
                if content.is_empty() {
                    continue;
                }
                if title.contains("состав") || title.contains("composition") {
                    record.set(fields::CONTENT, content);
                }
            }
        }

        if let Some(characteristics) = widget_json(&data, "webCharacteristics") {
            if let Some(weight_text) = find_weight(&characteristics) {
                record.set(fields::WEIGHT, normalize_weight(&weight_text));
            }
        }

        extract::derived_metrics(&mut record);
        extract::stamp(&mut record);

        record
    }
}

impl OzonExtractor {
    fn nutrition(&self, data: &Value, record: &mut Record) {
        let Some(info) = widget_json(data, "webNutritionInfo") else {
            return;
        };

        let mut proteins = String::new();
        let mut fats = String::new();
        let mut carbs = String::new();
        let mut calories = String::new();

        for item in info["values"].as_array().into_iter().flatten() {
            let label = item["label"].as_str().unwrap_or("").to_lowercase();
            let value = json_text(&item["value"]);

            if label.contains("белки") || label.contains("protein") {
                proteins = value;
            } else if label.contains("жиры") || label.contains("fat") {
                fats = value;
            } else if label.contains("углеводы") || label.contains("carbohydrate") {
                carbs = value;
            } else if label.contains("ккал") || label.contains("calorie") {
                calories = value;
            }
        }

        // If any macro is present, missing ones mean zero rather than
        // unknown.
        let pfc_present = !(proteins.is_empty() && fats.is_empty() && carbs.is_empty());
        if pfc_present {
            for value in [&mut proteins, &mut fats, &mut carbs] {
                if value.is_empty() {
                    *value = "0".into();
                }
            }
        }

        record.set(fields::PROTEINS, proteins);
        record.set(fields::FATS, fats);
        record.set(fields::CARBOHYDRATES, carbs);
        record.set(fields::CALORIES, calories);
    }
}

/// First widget whose id contains `key_part`, decoded from its
/// JSON-encoded string value.
fn widget_json(data: &Value, key_part: &str) -> Option<Value> {
    let widgets = data["widgetStates"].as_object()?;
    let raw = widgets
        .iter()
        .find(|(key, _)| key.contains(key_part))
        .map(|(_, value)| value)?;
    serde_json::from_str(raw.as_str()?).ok()
}

/// The `application/ld+json` block of the seo scripts.
fn json_ld(data: &Value) -> Option<Value> {
    data["seo"]["script"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|script| script["type"].as_str() == Some("application/ld+json"))
        .and_then(|script| script["innerHTML"].as_str())
        .and_then(|inner| serde_json::from_str(inner).ok())
}

fn find_weight(characteristics: &Value) -> Option<String> {
    for section in characteristics["characteristics"].as_array().into_iter().flatten() {
        for item in section["short"].as_array().into_iter().flatten() {
            let name = item["name"].as_str().unwrap_or("").to_lowercase();
            let key = item["key"].as_str().unwrap_or("").to_lowercase();

            let is_weight = name.contains("вес") || key.contains("weight");
            let is_volume = name.contains("объем") || key.contains("volume");
            if !(is_weight || is_volume) {
                continue;
            }

            let text = item["values"]
                .as_array()
                .and_then(|values| values.first())
                .and_then(|value| value["text"].as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Keep digits and the decimal point; litres scale to grams. An
/// unparseable value is kept raw rather than lost.
fn normalize_weight(raw_text: &str) -> String {
    let cleaned: String = raw_text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .collect::<String>()
        .replace(',', ".");

    let lower = raw_text.to_lowercase();
    if lower.contains('л') && !lower.contains("мл") {
        if let Ok(value) = cleaned.parse::<f64>() {
            return extract::fmt_number(value * 1000.0);
        }
    }

    if cleaned.is_empty() {
        raw_text.to_string()
    } else {
        cleaned
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items.first().map(json_text).unwrap_or_default(),
        _ => String::new(),
    }
}

/// One category page of the listing API: product links plus the path of
/// the next page.
pub fn parse_listing_page(raw: &str) -> (Vec<WorkItem>, Option<String>) {
    let Ok(data) = serde_json::from_str::<Value>(raw) else {
        return (Vec::new(), None);
    };

    let next_page = data["nextPage"].as_str().map(str::to_string);

    let Some(state_id) = data["layout"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|item| item["component"].as_str() == Some("tileGridDesktop"))
        .and_then(|item| item["stateId"].as_str())
    else {
        return (Vec::new(), next_page);
    };

    let Some(tiles) = data["widgetStates"][state_id]
        .as_str()
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
    else {
        return (Vec::new(), next_page);
    };

    let items = tiles["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["action"]["link"].as_str())
        .filter(|link| link.starts_with("/product/"))
        .map(|link| {
            let clean = link.split('?').next().unwrap_or(link);
            WorkItem::new(format!("{BASE_URL}{clean}"))
        })
        .collect();

    (items, next_page)
}
