use crate::error::{PipelineError, Result};
use crate::utils::format_plain_number;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// An untyped cell as delivered by a loader.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::Timestamp(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One source row: raw column names in source order, each with its cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A typed, cleaned cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Integer(i64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Timestamp(t) => Some(t.date()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Text form used for grouping and join keys.
    pub fn key_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_plain_number(*n),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// The null substitute for a column holding values shaped like `self`.
    pub fn empty_like(&self) -> FieldValue {
        match self {
            FieldValue::Text(_) => FieldValue::Text(String::new()),
            FieldValue::Number(_) => FieldValue::Number(0.0),
            FieldValue::Integer(_) => FieldValue::Integer(0),
            _ => FieldValue::Null,
        }
    }
}

pub type NormalizedRecord = BTreeMap<String, FieldValue>;

/// A record set sharing one canonical column list.
///
/// Every record holds exactly the keys listed in `columns`. Stages never mutate
/// a dataset; they return a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedDataset {
    columns: Vec<String>,
    records: Vec<NormalizedRecord>,
}

impl NormalizedDataset {
    pub fn new(columns: Vec<String>, records: Vec<NormalizedRecord>) -> Result<Self> {
        let expected: BTreeSet<&str> = columns.iter().map(String::as_str).collect();
        if expected.len() != columns.len() {
            let mut seen = BTreeSet::new();
            for column in &columns {
                if !seen.insert(column.as_str()) {
                    return Err(PipelineError::ColumnCollision {
                        canonical: column.clone(),
                        first: column.clone(),
                        second: column.clone(),
                    });
                }
            }
        }

        for (row, record) in records.iter().enumerate() {
            for column in &columns {
                if !record.contains_key(column) {
                    return Err(PipelineError::MissingColumn(column.clone()));
                }
            }
            if let Some(extra) = record.keys().find(|k| !expected.contains(k.as_str())) {
                return Err(PipelineError::UnexpectedColumn {
                    column: extra.clone(),
                    row,
                });
            }
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn require_column(&self, column: &str, consumer: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(PipelineError::MissingField {
                consumer: consumer.to_string(),
                field: column.to_string(),
            })
        }
    }

    /// Returns a new dataset with `new_columns` appended. `derive` is called once
    /// per record and must return one value per new column, in order.
    pub fn extend_with<F>(&self, new_columns: &[String], mut derive: F) -> Result<Self>
    where
        F: FnMut(usize, &NormalizedRecord) -> Result<Vec<FieldValue>>,
    {
        for column in new_columns {
            if self.has_column(column) {
                return Err(PipelineError::ColumnCollision {
                    canonical: column.clone(),
                    first: column.clone(),
                    second: column.clone(),
                });
            }
        }

        let mut records = Vec::with_capacity(self.records.len());
        for (row, record) in self.records.iter().enumerate() {
            let values = derive(row, record)?;
            let mut extended = record.clone();
            for (column, value) in new_columns.iter().zip(values) {
                extended.insert(column.clone(), value);
            }
            records.push(extended);
        }

        let mut columns = self.columns.clone();
        columns.extend(new_columns.iter().cloned());

        Self::new(columns, records)
    }

    /// Drops every record whose `field` equals `value` (compared as text).
    pub fn exclude_value(&self, field: &str, value: &str) -> Result<Self> {
        self.require_column(field, "filter")?;

        let records: Vec<NormalizedRecord> = self
            .records
            .iter()
            .filter(|r| r.get(field).map(|v| v.key_string() != value).unwrap_or(true))
            .cloned()
            .collect();

        Ok(Self {
            columns: self.columns.clone(),
            records,
        })
    }

    pub fn column_values(&self, field: &str) -> Result<Vec<&FieldValue>> {
        self.require_column(field, "column lookup")?;
        Ok(self
            .records
            .iter()
            .filter_map(|r| r.get(field))
            .collect())
    }

    pub fn distinct_text(&self, field: &str) -> Result<Vec<String>> {
        let values: BTreeSet<String> = self
            .column_values(field)?
            .into_iter()
            .map(FieldValue::key_string)
            .collect();
        Ok(values.into_iter().collect())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, FieldValue)]) -> NormalizedRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_dataset_rejects_uneven_key_sets() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let records = vec![
            record(&[("a", FieldValue::Number(1.0)), ("b", FieldValue::Number(2.0))]),
            record(&[("a", FieldValue::Number(3.0))]),
        ];

        let err = NormalizedDataset::new(columns, records).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "b"));
    }

    #[test]
    fn test_extend_with_does_not_touch_input() {
        let dataset = NormalizedDataset::new(
            vec!["a".to_string()],
            vec![record(&[("a", FieldValue::Number(2.0))])],
        )
        .unwrap();

        let extended = dataset
            .extend_with(&["double".to_string()], |_, r| {
                Ok(vec![FieldValue::Number(r["a"].as_f64().unwrap() * 2.0)])
            })
            .unwrap();

        assert_eq!(dataset.columns().len(), 1);
        assert_eq!(extended.columns().len(), 2);
        assert_eq!(extended.records()[0]["double"], FieldValue::Number(4.0));
    }

    #[test]
    fn test_extend_with_rejects_existing_column() {
        let dataset = NormalizedDataset::new(vec!["a".to_string()], vec![]).unwrap();
        let err = dataset
            .extend_with(&["a".to_string()], |_, _| Ok(vec![]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ColumnCollision { .. }));
    }

    #[test]
    fn test_exclude_value() {
        let dataset = NormalizedDataset::new(
            vec!["category".to_string()],
            vec![
                record(&[("category", FieldValue::Text("Fruit".into()))]),
                record(&[("category", FieldValue::Text("Save me".into()))]),
            ],
        )
        .unwrap();

        let kept = dataset.exclude_value("category", "Save me").unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.distinct_text("category").unwrap(), vec!["Fruit"]);
    }

    #[test]
    fn test_key_string_renders_integral_numbers_plainly() {
        assert_eq!(FieldValue::Number(42.0).key_string(), "42");
        assert_eq!(FieldValue::Integer(7).key_string(), "7");
        assert_eq!(
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()).key_string(),
            "2023-05-01"
        );
    }
}
