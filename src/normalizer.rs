use crate::error::{PipelineError, Result};
use crate::sanitizer::TextRule;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.*?\]").expect("bracket pattern is valid"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Maps raw column headers (`"Price before discount [EUR]"`, `"# of items"`) to
/// canonical identifiers (`"price_before_discount"`, `"num_of_items"`).
#[derive(Debug, Clone, Default)]
pub struct ColumnNormalizer {
    rule: TextRule,
}

impl ColumnNormalizer {
    pub fn new(rule: TextRule) -> Self {
        Self { rule }
    }

    pub fn normalize(&self, raw: &str) -> Result<String> {
        let without_brackets = BRACKETED.replace_all(raw, "");
        let numbered = without_brackets.replace('#', "num");
        let underscored = WHITESPACE_RUN.replace_all(numbered.trim(), "_");
        let canonical = self.rule.apply(&underscored).to_lowercase();

        if canonical.is_empty() {
            return Err(PipelineError::UnnamedColumn(raw.to_string()));
        }
        Ok(canonical)
    }

    /// Normalizes a full header row, rejecting empty names and collisions.
    pub fn normalize_all<'a, I>(&self, raw_names: I) -> Result<ColumnMapping>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        let mut seen: BTreeMap<String, String> = BTreeMap::new();

        for raw in raw_names {
            let canonical = self.normalize(raw)?;
            if let Some(first) = seen.get(&canonical) {
                return Err(PipelineError::ColumnCollision {
                    canonical,
                    first: first.clone(),
                    second: raw.to_string(),
                });
            }
            seen.insert(canonical.clone(), raw.to_string());
            entries.push((raw.to_string(), canonical));
        }

        Ok(ColumnMapping { entries })
    }
}

/// Raw header to canonical name, in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn canonical_for(&self, raw: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == raw)
            .map(|(_, c)| c.as_str())
    }

    pub fn contains_raw(&self, raw: &str) -> bool {
        self.canonical_for(raw).is_some()
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.entries.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(r, c)| (r.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        ColumnNormalizer::default().normalize(raw).unwrap()
    }

    #[test]
    fn test_bracketed_suffix_removed() {
        assert_eq!(normalize("Revenue [USD]"), "revenue");
        assert_eq!(normalize("Price [EUR]"), "price");
        assert_eq!(normalize("Discount value [EUR] [net]"), "discount_value");
    }

    #[test]
    fn test_hash_and_punctuation() {
        assert_eq!(normalize("# of sold SKU items"), "num_of_sold_sku_items");
        assert_eq!(
            normalize("Price before discount (includ. VAT), EUR"),
            "price_before_discount_includ_vat_eur"
        );
        assert_eq!(normalize("  Category   level 1 "), "category_level_1");
    }

    #[test]
    fn test_idempotent_on_canonical_names() {
        for raw in ["Revenue [USD]", "# of items", "Time", "Waste (# of items)"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_unnamed_column_rejected() {
        let err = ColumnNormalizer::default().normalize("[EUR]").unwrap_err();
        assert!(matches!(err, PipelineError::UnnamedColumn(raw) if raw == "[EUR]"));

        let err = ColumnNormalizer::default().normalize(" ?! ").unwrap_err();
        assert!(matches!(err, PipelineError::UnnamedColumn(_)));
    }

    #[test]
    fn test_collision_rejected() {
        let err = ColumnNormalizer::default()
            .normalize_all(["Revenue [USD]", "revenue"])
            .unwrap_err();
        match err {
            PipelineError::ColumnCollision {
                canonical,
                first,
                second,
            } => {
                assert_eq!(canonical, "revenue");
                assert_eq!(first, "Revenue [USD]");
                assert_eq!(second, "revenue");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_mapping_keeps_source_order() {
        let mapping = ColumnNormalizer::default()
            .normalize_all(["Time", "Category", "Units [pcs]"])
            .unwrap();
        assert_eq!(mapping.canonical_names(), vec!["time", "category", "units"]);
        assert_eq!(mapping.canonical_for("Units [pcs]"), Some("units"));
    }
}
