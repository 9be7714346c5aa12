//! Product catalog and matching of extracted product codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partial matches returned at most
pub const MAX_PARTIAL_MATCHES: usize = 5;

/// One catalog product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: Uuid,
    pub product_code: String,
    pub product_description: Option<String>,
    pub customer_name: Option<String>,
    pub is_active: bool,
    /// Non-stockable products are made to order and never labelled
    pub is_stockable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    CaseInsensitive,
    Partial,
}

impl MatchType {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchType::Exact => 1.0,
            MatchType::CaseInsensitive => 0.9,
            MatchType::Partial => 0.6,
        }
    }
}

/// Catalog candidate for an extracted code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product_code: String,
    pub product_description: Option<String>,
    pub customer_name: Option<String>,
    pub confidence: f64,
    pub match_type: MatchType,
}

impl ProductMatch {
    fn new(product: &Product, match_type: MatchType) -> Self {
        Self {
            product_code: product.product_code.clone(),
            product_description: product.product_description.clone(),
            customer_name: product.customer_name.clone(),
            confidence: match_type.confidence(),
            match_type,
        }
    }
}

/// Rank catalog candidates against an extracted code.
///
/// An exact code wins outright, then a case-insensitive code. Otherwise
/// every candidate whose code or description contains the term is a
/// partial match, in product code order, capped at [`MAX_PARTIAL_MATCHES`].
pub fn match_products(extracted: &str, candidates: &[Product]) -> Vec<ProductMatch> {
    let code = extracted.trim();
    if code.is_empty() {
        return Vec::new();
    }

    if let Some(exact) = candidates.iter().find(|p| p.product_code == code) {
        return vec![ProductMatch::new(exact, MatchType::Exact)];
    }
    if let Some(ci) = candidates
        .iter()
        .find(|p| p.product_code.eq_ignore_ascii_case(code))
    {
        return vec![ProductMatch::new(ci, MatchType::CaseInsensitive)];
    }

    let needle = code.to_lowercase();
    let mut partials: Vec<&Product> = candidates
        .iter()
        .filter(|p| {
            p.product_code.to_lowercase().contains(&needle)
                || p.product_description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect();
    partials.sort_by(|a, b| a.product_code.cmp(&b.product_code));

    partials
        .into_iter()
        .take(MAX_PARTIAL_MATCHES)
        .map(|p| ProductMatch::new(p, MatchType::Partial))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: &str, description: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            product_code: code.to_string(),
            product_description: Some(description.to_string()),
            customer_name: None,
            is_active: true,
            is_stockable: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_beats_case_insensitive() {
        let catalog = [product("tub-500", "Tub"), product("TUB-500", "Tub")];
        let matches = match_products("TUB-500", &catalog);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Exact);
        assert_eq!(matches[0].confidence, 1.0);
    }

    #[test]
    fn test_case_insensitive_match() {
        let catalog = [product("TUB-500", "Tub")];
        let matches = match_products(" tub-500 ", &catalog);
        assert_eq!(matches[0].product_code, "TUB-500");
        assert_eq!(matches[0].match_type, MatchType::CaseInsensitive);
    }

    #[test]
    fn test_blank_code_matches_nothing() {
        assert!(match_products("  ", &[product("TUB-500", "Tub")]).is_empty());
    }
}
