use crate::error::{PipelineError, Result};
use crate::record::{FieldValue, NormalizedDataset};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};
use log::debug;

pub const DATE_FIELD: &str = "date";
pub const DAY_NAME_FIELD: &str = "day_name";
pub const WEEKDAY_FIELD: &str = "weekday";
pub const DAY_OF_MONTH_FIELD: &str = "day_of_month";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];

pub fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn parse_timestamp(value: &FieldValue) -> Option<NaiveDateTime> {
    match value {
        FieldValue::Timestamp(t) => Some(*t),
        FieldValue::Date(d) => d.and_hms_opt(0, 0, 0),
        FieldValue::Text(s) => parse_timestamp_text(s),
        _ => None,
    }
}

/// Reads `field` of a record as a timestamp, reporting null or unparseable values.
pub fn require_timestamp(value: Option<&FieldValue>, field: &str, row: usize) -> Result<NaiveDateTime> {
    let value = value.ok_or_else(|| PipelineError::MissingTimestampField(field.to_string()))?;

    if value.is_null() {
        return Err(PipelineError::InvalidTimestamp {
            field: field.to_string(),
            row,
            details: "value is null".to_string(),
        });
    }

    parse_timestamp(value).ok_or_else(|| PipelineError::InvalidTimestamp {
        field: field.to_string(),
        row,
        details: format!("cannot parse '{}'", value.key_string()),
    })
}

pub fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Adds `date`, `day_name`, `weekday` (Monday = 1 .. Sunday = 7) and `day_of_month`.
///
/// Any record with a null or unparseable timestamp rejects the whole batch.
pub fn enrich_calendar(dataset: &NormalizedDataset, timestamp_field: &str) -> Result<NormalizedDataset> {
    if !dataset.has_column(timestamp_field) {
        return Err(PipelineError::MissingTimestampField(
            timestamp_field.to_string(),
        ));
    }

    let new_columns = [DATE_FIELD, DAY_NAME_FIELD, WEEKDAY_FIELD, DAY_OF_MONTH_FIELD]
        .map(str::to_string);

    let enriched = dataset.extend_with(&new_columns, |row, record| {
        let timestamp = require_timestamp(record.get(timestamp_field), timestamp_field, row)?;
        let date = timestamp.date();

        Ok(vec![
            FieldValue::Date(date),
            FieldValue::Text(day_name(date.weekday()).to_string()),
            FieldValue::Integer(date.weekday().number_from_monday() as i64),
            FieldValue::Integer(date.day() as i64),
        ])
    })?;

    debug!(
        "Calendar attributes derived from '{}' for {} records",
        timestamp_field,
        enriched.len()
    );

    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NormalizedRecord;

    fn dataset_with_times(times: &[FieldValue]) -> NormalizedDataset {
        let records = times
            .iter()
            .map(|t| {
                let mut record = NormalizedRecord::new();
                record.insert("time".to_string(), t.clone());
                record
            })
            .collect();
        NormalizedDataset::new(vec!["time".to_string()], records).unwrap()
    }

    #[test]
    fn test_weekday_numbering_is_monday_one() {
        // 2024-03-04 is a Monday, 2024-03-10 a Sunday
        let dataset = dataset_with_times(&[
            FieldValue::Text("2024-03-04 09:15:00".into()),
            FieldValue::Text("2024-03-10T23:59:59".into()),
        ]);

        let enriched = enrich_calendar(&dataset, "time").unwrap();
        let monday = &enriched.records()[0];
        let sunday = &enriched.records()[1];

        assert_eq!(monday[WEEKDAY_FIELD], FieldValue::Integer(1));
        assert_eq!(monday[DAY_NAME_FIELD], FieldValue::Text("Monday".into()));
        assert_eq!(sunday[WEEKDAY_FIELD], FieldValue::Integer(7));
        assert_eq!(sunday[DAY_NAME_FIELD], FieldValue::Text("Sunday".into()));
        assert_eq!(sunday[DAY_OF_MONTH_FIELD], FieldValue::Integer(10));
    }

    #[test]
    fn test_date_is_truncated_to_day() {
        let timestamp = NaiveDate::from_ymd_opt(2023, 7, 15)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        let dataset = dataset_with_times(&[FieldValue::Timestamp(timestamp)]);

        let enriched = enrich_calendar(&dataset, "time").unwrap();
        assert_eq!(
            enriched.records()[0][DATE_FIELD],
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 7, 15).unwrap())
        );
    }

    #[test]
    fn test_unparseable_timestamp_rejects_batch() {
        let dataset = dataset_with_times(&[
            FieldValue::Text("2024-03-04".into()),
            FieldValue::Text("yesterday".into()),
        ]);

        let err = enrich_calendar(&dataset, "time").unwrap_err();
        match err {
            PipelineError::InvalidTimestamp { field, row, .. } => {
                assert_eq!(field, "time");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_null_and_missing_timestamp() {
        let dataset = dataset_with_times(&[FieldValue::Null]);
        assert!(matches!(
            enrich_calendar(&dataset, "time"),
            Err(PipelineError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            enrich_calendar(&dataset, "created_at"),
            Err(PipelineError::MissingTimestampField(f)) if f == "created_at"
        ));
    }

    #[test]
    fn test_parse_formats() {
        assert!(parse_timestamp_text("2024-01-31").is_some());
        assert!(parse_timestamp_text("31.01.2024").is_some());
        assert!(parse_timestamp_text("2024-01-31T10:00:00+02:00").is_some());
        assert!(parse_timestamp_text("2024-01-31 10:00").is_some());
        assert!(parse_timestamp_text("Jan 31").is_none());
    }
}
