use crate::calendar::parse_timestamp_text;
use crate::error::{PipelineError, Result};
use crate::metrics::{payment_metrics, retail_metrics, MetricDefinition, PaymentColumns, RetailColumns};
use crate::normalizer::ColumnNormalizer;
use crate::record::{RawRecord, RawValue};
use crate::sanitizer::CleaningRules;
use chrono::Weekday;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ColumnKind {
    #[schemars(description = "Free text. Cleaned with the text rule; nulls become the empty string.")]
    Text,

    #[schemars(description = "Numbers. Numeric text is parsed; nulls become zero.")]
    Numeric,

    #[schemars(
        description = "Date or date-time values. Kept as delivered and parsed by the calendar stage."
    )]
    Timestamp,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Text => "Text",
            ColumnKind::Numeric => "Numeric",
            ColumnKind::Timestamp => "Timestamp",
        };
        f.write_str(name)
    }
}

/// Declared kind of every canonical column, keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ColumnTypes(BTreeMap<String, ColumnKind>);

impl ColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, kind: ColumnKind) -> Self {
        self.0.insert(column.into(), kind);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, kind: ColumnKind) {
        self.0.insert(column.into(), kind);
    }

    pub fn get(&self, column: &str) -> Option<ColumnKind> {
        self.0.get(column).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.0.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derives declarations from observed values: a column is `Timestamp` when every
    /// non-null cell is a timestamp or timestamp text, `Numeric` when every non-null
    /// cell is a number or numeric text, and `Text` otherwise. A column with only
    /// nulls cannot be typed.
    pub fn infer(records: &[RawRecord], normalizer: &ColumnNormalizer) -> Result<Self> {
        let Some(first) = records.first() else {
            return Ok(Self::default());
        };

        let mapping = normalizer.normalize_all(first.columns())?;
        let mut types = Self::default();

        for (raw, canonical) in mapping.iter() {
            let mut seen_number = false;
            let mut seen_timestamp = false;
            let mut seen_text = false;

            for record in records {
                match record.get(raw) {
                    Some(RawValue::Number(_)) => seen_number = true,
                    Some(RawValue::Timestamp(_)) => seen_timestamp = true,
                    Some(RawValue::Text(s)) => match s.trim().parse::<f64>() {
                        Ok(n) if n.is_finite() => seen_number = true,
                        _ if parse_timestamp_text(s).is_some() => seen_timestamp = true,
                        _ => seen_text = true,
                    },
                    Some(RawValue::Null) | None => {}
                }
            }

            let kind = match (seen_text, seen_number, seen_timestamp) {
                (false, false, false) => {
                    return Err(PipelineError::AmbiguousColumnType(canonical.to_string()))
                }
                (false, true, false) => ColumnKind::Numeric,
                (false, false, true) => ColumnKind::Timestamp,
                _ => ColumnKind::Text,
            };
            types.insert(canonical, kind);
        }

        Ok(types)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum WeekEnd {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    #[default]
    Sunday,
}

impl WeekEnd {
    pub fn weekday(self) -> Weekday {
        match self {
            WeekEnd::Monday => Weekday::Mon,
            WeekEnd::Tuesday => Weekday::Tue,
            WeekEnd::Wednesday => Weekday::Wed,
            WeekEnd::Thursday => Weekday::Thu,
            WeekEnd::Friday => Weekday::Fri,
            WeekEnd::Saturday => Weekday::Sat,
            WeekEnd::Sunday => Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ShowBy {
    #[schemars(description = "Plot each category's share of the weekly total (0-100)")]
    #[default]
    Percentage,

    #[schemars(description = "Plot each category's summed weekly values")]
    Absolute,
}

fn default_columns() -> usize {
    crate::layout::DEFAULT_COLUMNS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ChartRequest {
    #[schemars(description = "Canonical column holding the category each row belongs to")]
    pub category_field: String,

    #[schemars(description = "Canonical numeric columns to sum per category and week")]
    pub metrics: Vec<String>,

    #[serde(default)]
    pub show_by: ShowBy,

    #[schemars(description = "Axis label prefix, e.g. 'Revenue'")]
    pub y_label: String,

    #[serde(default)]
    #[schemars(description = "Weekday on which every aggregation week ends. Defaults to Sunday.")]
    pub week_end: WeekEnd,

    #[serde(default = "default_columns")]
    #[schemars(description = "Subplots per grid row. Defaults to 3.")]
    pub columns: usize,
}

impl ChartRequest {
    pub fn new(category_field: impl Into<String>, metrics: &[&str], y_label: impl Into<String>) -> Self {
        Self {
            category_field: category_field.into(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            show_by: ShowBy::default(),
            y_label: y_label.into(),
            week_end: WeekEnd::default(),
            columns: default_columns(),
        }
    }

    pub fn show_by(mut self, show_by: ShowBy) -> Self {
        self.show_by = show_by;
        self
    }

    pub fn week_end(mut self, week_end: WeekEnd) -> Self {
        self.week_end = week_end;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PipelineConfig {
    #[schemars(
        description = "Canonical column the calendar attributes are derived from. Omit to skip the calendar stage."
    )]
    pub timestamp_column: Option<String>,

    #[schemars(description = "Declared kind of every canonical column in the input")]
    pub column_types: ColumnTypes,

    #[serde(default)]
    #[schemars(description = "Derived metrics, applied in order after cleaning")]
    pub metrics: Vec<MetricDefinition>,

    #[serde(default)]
    pub rules: CleaningRules,
}

impl PipelineConfig {
    pub fn new(column_types: ColumnTypes) -> Self {
        Self {
            timestamp_column: None,
            column_types,
            metrics: Vec::new(),
            rules: CleaningRules::default(),
        }
    }

    /// Retail sales configuration: calendar from `timestamp_column` plus the retail
    /// revenue and profit metrics.
    pub fn retail(
        column_types: ColumnTypes,
        timestamp_column: impl Into<String>,
        columns: &RetailColumns,
    ) -> Self {
        Self {
            timestamp_column: Some(timestamp_column.into()),
            metrics: retail_metrics(columns),
            ..Self::new(column_types)
        }
    }

    pub fn payments(column_types: ColumnTypes, columns: &PaymentColumns) -> Self {
        Self {
            metrics: payment_metrics(columns),
            ..Self::new(column_types)
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = PipelineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("column_types"));
        assert!(schema_json.contains("timestamp_column"));
        assert!(schema_json.contains("metrics"));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "timestamp_column": "time",
            "column_types": {
                "time": "Timestamp",
                "category": "Text",
                "units_sold": "Numeric"
            }
        }"#;

        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.timestamp_column.as_deref(), Some("time"));
        assert_eq!(config.column_types.get("units_sold"), Some(ColumnKind::Numeric));
        assert!(config.metrics.is_empty());
        assert_eq!(config.rules, CleaningRules::default());
    }

    #[test]
    fn test_chart_request_defaults() {
        let json = r#"{
            "category_field": "category_level_1",
            "metrics": ["revenue_before_discount"],
            "y_label": "Revenue"
        }"#;

        let request: ChartRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.show_by, ShowBy::Percentage);
        assert_eq!(request.week_end, WeekEnd::Sunday);
        assert_eq!(request.columns, 3);
    }

    #[test]
    fn test_infer_types() {
        let records = vec![
            RawRecord::new()
                .with("Category", "Fruit")
                .with("Units", 3.0)
                .with("Note", RawValue::Null),
            RawRecord::new()
                .with("Category", "Veg")
                .with("Units", RawValue::Null)
                .with("Note", "fresh"),
        ];

        let types = ColumnTypes::infer(&records, &ColumnNormalizer::default()).unwrap();
        assert_eq!(types.get("category"), Some(ColumnKind::Text));
        assert_eq!(types.get("units"), Some(ColumnKind::Numeric));
        assert_eq!(types.get("note"), Some(ColumnKind::Text));
    }

    #[test]
    fn test_infer_types_from_csv_text() {
        let records = crate::ingestion::read_raw_records(
            "Time,Code,Units\n2024-01-01 10:00:00,007,3\n2024-01-02 11:00:00,A12,4.5\n".as_bytes(),
        )
        .unwrap();

        let types = ColumnTypes::infer(&records, &ColumnNormalizer::default()).unwrap();
        assert_eq!(types.get("time"), Some(ColumnKind::Timestamp));
        assert_eq!(types.get("code"), Some(ColumnKind::Text));
        assert_eq!(types.get("units"), Some(ColumnKind::Numeric));
    }

    #[test]
    fn test_infer_rejects_all_null_column() {
        let records = vec![RawRecord::new().with("Empty", RawValue::Null)];
        let err = ColumnTypes::infer(&records, &ColumnNormalizer::default()).unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousColumnType(c) if c == "empty"));
    }
}
