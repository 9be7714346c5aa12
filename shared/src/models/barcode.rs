//! Carton barcode identifiers
//!
//! Format: `{PREFIX}-{PRODUCT_CODE}-{COLOUR_SHORT}-{YYYYMMDD}-{SEQ}` where the
//! sequence restarts every day for each product/colour pair.

use chrono::NaiveDate;

/// Prefix printed on every carton label
pub const DEFAULT_BARCODE_PREFIX: &str = "RJ";

/// Short codes for colours that don't abbreviate well by truncation
const COLOUR_SHORT_OVERRIDES: &[(&str, &str)] = &[
    ("black", "BLK"),
    ("white", "WHT"),
    ("yellow", "YEL"),
    ("natural", "NAT"),
    ("red", "RED"),
    ("blue", "BLU"),
    ("green", "GRN"),
    ("grey", "GRY"),
    ("gray", "GRY"),
    ("orange", "ORG"),
    ("brown", "BRN"),
    ("clear", "CLR"),
];

/// Three-letter colour code used inside barcodes
pub fn colour_short(colour: &str) -> String {
    let trimmed = colour.trim();
    let normalised = trimmed.to_lowercase();

    COLOUR_SHORT_OVERRIDES
        .iter()
        .find(|(name, _)| *name == normalised)
        .map(|(_, short)| short.to_string())
        .unwrap_or_else(|| trimmed.chars().take(3).collect::<String>().to_uppercase())
}

/// Everything before the sequence number, including the trailing dash
pub fn barcode_prefix(prefix: &str, product_code: &str, colour: &str, date: NaiveDate) -> String {
    format!(
        "{}-{}-{}-{}-",
        prefix,
        product_code,
        colour_short(colour),
        date.format("%Y%m%d")
    )
}

/// Sequence number of `barcode` if it belongs to `prefix`
pub fn parse_sequence(barcode: &str, prefix: &str) -> Option<u32> {
    let seq = barcode.strip_prefix(prefix)?;
    if seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

/// Highest sequence already issued under `prefix`, zero when none.
///
/// Compares numerically so `1000` sorts after `999`.
pub fn max_sequence<'a, I>(existing: I, prefix: &str) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|barcode| parse_sequence(barcode, prefix))
        .max()
        .unwrap_or(0)
}

/// `count` consecutive barcodes following `current_max`
pub fn sequence_barcodes(prefix: &str, current_max: u32, count: u32) -> Vec<String> {
    (1..=count)
        .map(|i| format!("{}{:03}", prefix, current_max + i))
        .collect()
}

/// Escape `%`, `_` and `\` for use inside a SQL `LIKE` pattern
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every generated barcode parses back to its own sequence number
        #[test]
        fn prop_sequence_round_trips(current_max in 0u32..5_000, count in 1u32..50) {
            let prefix = "RJ-ABC-BLK-20260101-";
            let ids = sequence_barcodes(prefix, current_max, count);

            prop_assert_eq!(ids.len() as u32, count);
            prop_assert_eq!(
                max_sequence(ids.iter().map(String::as_str), prefix),
                current_max + count
            );
        }
    }
}
