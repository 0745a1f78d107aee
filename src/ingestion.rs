use crate::error::Result;
use crate::record::{RawRecord, RawValue};
use csv::ReaderBuilder;
use log::{info, warn};
use std::io::Read;
use std::path::Path;

/// Reads a CSV export into raw records. The header row names the columns; empty
/// cells become nulls and every other cell stays text. Typing is left to the
/// declared column kinds, so codes such as `007` survive in text columns.
pub fn read_raw_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut records = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let row = result?;
        if row.len() > headers.len() {
            warn!(
                "Row {} has {} cells but the header has {}; extra cells ignored",
                idx,
                row.len(),
                headers.len()
            );
        }

        let record = RawRecord::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(col, name)| (name, row.get(col).map(parse_raw_cell).unwrap_or(RawValue::Null))),
        );
        records.push(record);
    }

    info!("Read {} raw records with {} columns", records.len(), headers.len());
    Ok(records)
}

pub fn read_raw_records_from_path(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path)?;
    read_raw_records(file)
}

pub fn parse_raw_cell(cell: &str) -> RawValue {
    if cell.trim().is_empty() {
        RawValue::Null
    } else {
        RawValue::Text(cell.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_empty_cells() {
        let csv = "Time,Category,Units [pcs]\n2024-01-01 10:00:00,Fruit,3\n2024-01-02 11:00:00,,\n";
        let records = read_raw_records(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].columns().collect::<Vec<_>>(),
            vec!["Time", "Category", "Units [pcs]"]
        );
        assert_eq!(
            records[0].get("Units [pcs]"),
            Some(&RawValue::Text("3".to_string()))
        );
        assert_eq!(
            records[0].get("Time"),
            Some(&RawValue::Text("2024-01-01 10:00:00".to_string()))
        );
        assert_eq!(records[1].get("Category"), Some(&RawValue::Null));
        assert_eq!(records[1].get("Units [pcs]"), Some(&RawValue::Null));
    }

    #[test]
    fn test_short_rows_read_as_null() {
        let csv = "a,b,c\n1,2\n";
        let records = read_raw_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].get("c"), Some(&RawValue::Null));
    }

    #[test]
    fn test_cells_are_not_typed_early() {
        assert_eq!(parse_raw_cell("007"), RawValue::Text("007".to_string()));
        assert_eq!(parse_raw_cell("NaN"), RawValue::Text("NaN".to_string()));
        assert_eq!(parse_raw_cell("  "), RawValue::Null);
    }
}
