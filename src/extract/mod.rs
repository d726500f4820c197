//! Field extraction: raw page payload in, [`Record`] out.
//!
//! Extractors are pure and total. Every field has a documented default
//! and degrades to it when the markup does not cooperate; a partial
//! record is an expected outcome, not an error. The out-of-stock rule is
//! deliberately a pluggable predicate per extractor: the shops disagree
//! on how "unavailable" is signalled and no canonical precedence is
//! imposed here.

pub mod ozon;
pub mod vkusvill;

pub use ozon::OzonExtractor;
pub use vkusvill::VkusvillExtractor;

use crate::domain::Record;

/// Column names shared with the persisted datasets.
pub mod fields {
    pub const NAME: &str = "name";
    pub const PRICE: &str = "price";
    pub const WEIGHT: &str = "weight";
    pub const CALORIES: &str = "calories";
    pub const PROTEINS: &str = "proteins";
    pub const FATS: &str = "fats";
    pub const CARBOHYDRATES: &str = "carbohydrates";
    pub const CONTENT: &str = "content";
    pub const DESCRIPTION: &str = "description";
    pub const AVAILABILITY: &str = "availability";
    pub const CATEGORY: &str = "category";
    pub const RATING: &str = "average_rating";
    pub const RATING_COUNT: &str = "rating_count";
    pub const IMG_URL: &str = "imgUrl";
    pub const HTML_PATH: &str = "html_path";
    pub const FETCH_ERR: &str = "fetchErr";
    pub const LAST_UPDATED: &str = "last_upd_time";
    /// Protein-to-calorie ratio.
    pub const PRO_CAL: &str = "pro/cal";
    /// Price-to-weight ratio.
    pub const PRI_WE: &str = "pri/we";
}

/// The field-extracting collaborator.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, raw: &str, url: &str) -> Record;
}

/// Record template with the mandatory columns pre-filled. Further fields
/// are added by plain assignment and the CSV layer picks them up.
pub fn base_record(url: &str) -> Record {
    let mut record = Record::new(url);
    record.set(fields::FETCH_ERR, "");
    record
}

/// Stamp the record with the extraction time.
pub fn stamp(record: &mut Record) {
    record.set(
        fields::LAST_UPDATED,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    );
}

/// Parse a decimal that may use a comma separator.
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse().ok()
}

/// Weight text to grams. Millilitres count as grams; кг and л scale by
/// 1000; an unknown unit keeps the bare value. Returns `None` when no
/// number can be read at all (callers substitute their default).
pub fn weight_to_grams(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace(',', ".")
        .to_lowercase();

    let unit_start = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(unit_start);
    if number.is_empty() {
        return None;
    }
    let value: f64 = number.parse().ok()?;

    Some(match unit.trim_end_matches('.') {
        "г" | "гр" | "грамм" => value,
        "мл" | "миллилитр" | "миллилитров" => value,
        "кг" | "килограмм" => value * 1000.0,
        "л" | "литр" | "литров" => value * 1000.0,
        _ => value,
    })
}

/// Number formatting used for derived cells: whole values lose the
/// fraction, everything else keeps the shortest decimal form.
pub fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Compute the derived ratio columns from whatever macro/price/weight
/// fields the record carries. Unparseable inputs yield "0".
pub fn derived_metrics(record: &mut Record) {
    let value = |key: &str| parse_decimal(record.get_or_empty(key));

    let pro_cal = match (value(fields::PROTEINS), value(fields::CALORIES)) {
        (Some(proteins), Some(calories)) if calories > 0.0 => proteins / calories,
        _ => 0.0,
    };

    let pri_we = match (value(fields::PRICE), value(fields::WEIGHT)) {
        (Some(price), Some(weight)) if weight > 0.0 => price / weight,
        _ => 0.0,
    };

    record.set(fields::PRO_CAL, fmt_number(pro_cal));
    record.set(fields::PRI_WE, fmt_number(pri_we));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_record_prefills_fetch_err() {
        let record = base_record("https://example.com/p/1");
        assert_eq!(record.get(fields::FETCH_ERR), Some(""));
    }

    #[test]
    fn test_parse_decimal_accepts_comma() {
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal(" 7.2 "), Some(7.2));
        assert_eq!(parse_decimal("нет"), None);
    }

    #[test]
    fn test_weight_units() {
        assert_eq!(weight_to_grams("300 г"), Some(300.0));
        assert_eq!(weight_to_grams("300 гр."), Some(300.0));
        assert_eq!(weight_to_grams("0,5 кг"), Some(500.0));
        assert_eq!(weight_to_grams("250 мл"), Some(250.0));
        assert_eq!(weight_to_grams("1 л"), Some(1000.0));
        assert_eq!(weight_to_grams("2 шт"), Some(2.0));
        assert_eq!(weight_to_grams("300"), Some(300.0));
        assert_eq!(weight_to_grams("около кило"), None);
    }

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(300.0), "300");
        assert_eq!(fmt_number(0.0), "0");
        assert_eq!(fmt_number(0.43), "0.43");
    }

    #[test]
    fn test_derived_metrics() {
        let mut record = base_record("u");
        record
            .set(fields::PROTEINS, "10")
            .set(fields::CALORIES, "200")
            .set(fields::PRICE, "150")
            .set(fields::WEIGHT, "300");
        derived_metrics(&mut record);

        assert_eq!(record.get(fields::PRO_CAL), Some("0.05"));
        assert_eq!(record.get(fields::PRI_WE), Some("0.5"));
    }

    #[test]
    fn test_derived_metrics_zero_on_missing_inputs() {
        let mut record = base_record("u");
        derived_metrics(&mut record);

        assert_eq!(record.get(fields::PRO_CAL), Some("0"));
        assert_eq!(record.get(fields::PRI_WE), Some("0"));
    }
}
