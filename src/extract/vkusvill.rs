//! VkusVill product and listing markup.
//!
//! Every field degrades independently: the shop reshuffles its markup
//! often, so each lookup has a fallback and a default instead of an
//! error path.

use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};

use crate::domain::{Record, WorkItem};
use crate::extract::{self, fields, FieldExtractor};

pub const BASE_URL: &str = "https://vkusvill.ru";

/// Weight assumed when the card carries none.
const DEFAULT_WEIGHT_G: f64 = 1000.0;

/// Swappable out-of-stock rule.
pub type AvailabilityFn = Arc<dyn Fn(&Html) -> i64 + Send + Sync>;

pub struct VkusvillExtractor {
    availability: AvailabilityFn,
    sel: Selectors,
    nutrition_triple: Regex,
    kcal_re: Regex,
    proteins_re: Regex,
    fats_re: Regex,
    carbs_re: Regex,
    segment_split: Regex,
}

struct Selectors {
    title: Selector,
    weight: Selector,
    price: Selector,
    image: Selector,
    description: Selector,
    energy: Selector,
    energy_value: Selector,
    energy_desc: Selector,
    info_item: Selector,
    info_title: Selector,
    info_desc: Selector,
    composition: Selector,
    rating: Selector,
    rating_count: Selector,
    category: Selector,
}

fn sel(source: &str) -> Selector {
    Selector::parse(source).expect("static selector")
}

impl Default for VkusvillExtractor {
    fn default() -> Self {
        Self::new(Arc::new(default_availability))
    }
}

impl VkusvillExtractor {
    pub fn new(availability: AvailabilityFn) -> Self {
        Self {
            availability,
            sel: Selectors {
                title: sel("h1.Product__title"),
                weight: sel("div.ProductCard__weight"),
                price: sel(r#"meta[itemprop="price"]"#),
                image: sel(r#"meta[itemprop="image"]"#),
                description: sel("div.VV23_DetailProdPageDescription"),
                energy: sel("div.VV23_DetailProdPageAccordion__Energy"),
                energy_value: sel("div.VV23_DetailProdPageAccordion__EnergyValue"),
                energy_desc: sel("div.VV23_DetailProdPageAccordion__EnergyDesc"),
                info_item: sel("div.VV23_DetailProdPageInfoDescItem"),
                info_title: sel(".VV23_DetailProdPageInfoDescItem__Title"),
                info_desc: sel("div.VV23_DetailProdPageInfoDescItem__Desc"),
                composition: sel("div.Product__text--composition"),
                rating: sel("div.Rating__text"),
                rating_count: sel("div.VV23_DetailProdPageInfoTabs__HeaderTogglerCount"),
                category: sel("span.js-datalayer-catalog-list-category"),
            },
            nutrition_triple: Regex::new(
                r"(?i)белки\s+([\d\.,]+)\s*г[^\d]*жиры\s+([\d\.,]+)\s*г[^\d]*([\d\.,]+)\s*(?:ккал|кал)",
            )
            .expect("static regex"),
            kcal_re: Regex::new(r"(?i)([\d\.,]+)\s*(?:ккал|кал)").expect("static regex"),
            proteins_re: Regex::new(r"(?i)белки\s+([\d\.,]+)").expect("static regex"),
            fats_re: Regex::new(r"(?i)жиры\s+([\d\.,]+)").expect("static regex"),
            carbs_re: Regex::new(r"(?i)углеводы\s+([\d\.,]+)").expect("static regex"),
            segment_split: Regex::new(r"[\.\u{2026}\u{00A0}]+").expect("static regex"),
        }
    }

    fn first_text(&self, doc: &Html, selector: &Selector) -> Option<String> {
        doc.select(selector)
            .next()
            .map(|el| normalize(&el.text().collect::<String>()))
    }

    fn meta_content(&self, doc: &Html, selector: &Selector) -> Option<String> {
        doc.select(selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(str::to_string)
    }

    /// Primary nutrition source: the value/label pairs of the energy
    /// accordion. Returns (kcal, proteins, fats, carbohydrates).
    fn nutrition_from_accordion(&self, doc: &Html) -> (f64, f64, f64, f64) {
        let (mut kcal, mut proteins, mut fats, mut carbs) = (0.0, 0.0, 0.0, 0.0);

        let Some(block) = doc.select(&self.sel.energy).next() else {
            return (kcal, proteins, fats, carbs);
        };

        let values = block.select(&self.sel.energy_value);
        let descs = block.select(&self.sel.energy_desc);
        for (value, desc) in values.zip(descs) {
            let Some(number) = extract::parse_decimal(&normalize(&value.text().collect::<String>()))
            else {
                continue;
            };
            let label = normalize(&desc.text().collect::<String>()).to_lowercase();

            if label.contains("ккал") {
                kcal = number;
            } else if label.contains("белки") {
                proteins = number;
            } else if label.contains("жиры") {
                fats = number;
            } else if label.contains("углеводы") {
                carbs = number;
            }
        }

        (kcal, proteins, fats, carbs)
    }

    /// Fallback nutrition source: the free-text "Пищевая и энергетическая
    /// ценность" description block. Of all candidate readings the one with
    /// the highest kcal wins.
    fn nutrition_from_text(&self, doc: &Html) -> Option<(f64, f64, f64, f64)> {
        let mut nutrition_text = None;
        for item in doc.select(&self.sel.info_item) {
            let Some(title) = item.select(&self.sel.info_title).next() else {
                continue;
            };
            let title = normalize(&title.text().collect::<String>());
            if title.contains("Пищевая и энергетическая ценность") {
                nutrition_text = item
                    .select(&self.sel.info_desc)
                    .next()
                    .map(|el| el.text().collect::<String>());
                break;
            }
        }
        let text = nutrition_text?;

        let mut candidates: Vec<(f64, f64, f64, f64)> = self
            .nutrition_triple
            .captures_iter(&text)
            .filter_map(|caps| {
                Some((
                    extract::parse_decimal(caps.get(3)?.as_str())?,
                    extract::parse_decimal(caps.get(1)?.as_str())?,
                    extract::parse_decimal(caps.get(2)?.as_str())?,
                    0.0,
                ))
            })
            .collect();

        if candidates.is_empty() {
            for segment in self.segment_split.split(&text) {
                let Some(kcal) = self
                    .kcal_re
                    .captures(segment)
                    .and_then(|caps| extract::parse_decimal(&caps[1]))
                else {
                    continue;
                };
                let grab = |re: &Regex| {
                    re.captures(segment)
                        .and_then(|caps| extract::parse_decimal(&caps[1]))
                        .unwrap_or(0.0)
                };
                candidates.push((
                    kcal,
                    grab(&self.proteins_re),
                    grab(&self.fats_re),
                    grab(&self.carbs_re),
                ));
            }
        }

        candidates
            .into_iter()
            .max_by(|a, b| {
                (a.0, -a.1)
                    .partial_cmp(&(b.0, -b.1))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

impl FieldExtractor for VkusvillExtractor {
    fn extract(&self, raw: &str, url: &str) -> Record {
        let doc = Html::parse_document(raw);
        let mut record = extract::base_record(url);

        let mut name = self.first_text(&doc, &self.sel.title).unwrap_or_default();

        let weight = self
            .first_text(&doc, &self.sel.weight)
            .and_then(|text| extract::weight_to_grams(&text))
            .unwrap_or(DEFAULT_WEIGHT_G);

        let price = self.meta_content(&doc, &self.sel.price).unwrap_or_default();
        let image = self.meta_content(&doc, &self.sel.image).unwrap_or_default();

        let description = self
            .first_text(&doc, &self.sel.description)
            .map(|text| strip_label(&text, "Описание"))
            .unwrap_or_default();

        let composition = self
            .first_text(&doc, &self.sel.composition)
            .map(|text| strip_label(&text, "Состав"))
            .unwrap_or_default();

        let availability = (self.availability)(&doc);

        let (mut kcal, proteins, fats, carbs) = self.nutrition_from_accordion(&doc);
        if kcal == 0.0 && proteins == 0.0 && fats == 0.0 && carbs == 0.0 {
            if let Some(read) = self.nutrition_from_text(&doc) {
                let (k, p, f, c) = read;
                name = format!("!!{name}");
                record.set(fields::CALORIES, extract::fmt_number(k));
                record.set(fields::PROTEINS, extract::fmt_number(p));
                record.set(fields::FATS, extract::fmt_number(f));
                record.set(fields::CARBOHYDRATES, extract::fmt_number(c));
            } else {
                // Nothing anywhere: macros stay empty rather than zero.
                record.set(fields::CALORIES, "");
                record.set(fields::PROTEINS, "");
                record.set(fields::FATS, "");
                record.set(fields::CARBOHYDRATES, "");
            }
        } else {
            if kcal == 0.0 {
                kcal = 4.0 * proteins + 9.0 * fats + 4.0 * carbs;
            }
            record.set(fields::CALORIES, extract::fmt_number(kcal));
            record.set(fields::PROTEINS, extract::fmt_number(proteins));
            record.set(fields::FATS, extract::fmt_number(fats));
            record.set(fields::CARBOHYDRATES, extract::fmt_number(carbs));
        }

        let category = self
            .first_text(&doc, &self.sel.category)
            .map(|text| text.replace("//", "#"))
            .unwrap_or_default();

        record.set(fields::NAME, name);
        record.set(fields::WEIGHT, extract::fmt_number(weight));
        record.set(fields::PRICE, price);
        record.set(fields::IMG_URL, image);
        record.set(fields::DESCRIPTION, description);
        record.set(fields::CONTENT, composition);
        record.set(fields::AVAILABILITY, availability.to_string());
        record.set(
            fields::RATING,
            self.first_text(&doc, &self.sel.rating).unwrap_or_default(),
        );
        record.set(
            fields::RATING_COUNT,
            self.first_text(&doc, &self.sel.rating_count)
                .unwrap_or_default(),
        );
        record.set(fields::CATEGORY, category);

        extract::derived_metrics(&mut record);
        extract::stamp(&mut record);

        record
    }
}

/// Default out-of-stock rule: the quantity block must exist and not be
/// flagged `not_avail`; the count comes from `data-quantity` with the
/// first integer of the text as fallback; "Завтра будет" (tomorrow)
/// counts as unavailable today.
pub fn default_availability(doc: &Html) -> i64 {
    let quantity_block = sel("#product-quantity-block");
    let Some(block) = doc.select(&quantity_block).next() else {
        return 0;
    };

    let classes = block.value().attr("class").unwrap_or("");
    if classes.split_whitespace().any(|class| class == "not_avail") {
        return 0;
    }

    let text = normalize(&block.text().collect::<String>());
    if text.contains("Завтра") {
        return 0;
    }

    if let Some(quantity) = block
        .value()
        .attr("data-quantity")
        .and_then(|value| extract::parse_decimal(value))
    {
        return quantity as i64;
    }

    first_integer(&text).unwrap_or(0)
}

fn first_integer(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Listing page → product links, absolutized against the shop base.
pub fn parse_listing(raw: &str) -> Vec<WorkItem> {
    let doc = Html::parse_document(raw);
    let link = sel("div.ProductCards__item a.js-product-detail-link");

    doc.select(&link)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                WorkItem::new(href)
            } else {
                WorkItem::new(format!("{BASE_URL}{href}"))
            }
        })
        .collect()
}

/// Total category pages from the pager block; a missing pager means a
/// single page.
pub fn total_pages(raw: &str) -> usize {
    let doc = Html::parse_document(raw);
    let pager_link = sel("div.VV_Pager.js-lk-pager a[data-page]");

    doc.select(&pager_link)
        .filter_map(|a| a.value().attr("data-page"))
        .filter_map(|page| page.parse::<usize>().ok())
        .max()
        .unwrap_or(1)
}

pub fn page_url(category_url: &str, page: usize) -> String {
    format!("{category_url}?PAGEN_1={page}")
}

fn normalize(text: &str) -> String {
    text.replace('\u{a0}', " ").trim().to_string()
}

fn strip_label(text: &str, label: &str) -> String {
    text.trim()
        .strip_prefix(label)
        .unwrap_or(text.trim())
        .trim()
        .to_string()
}
