//! Organization-by-month payment panel.
//!
//! Every organization gets one row per calendar month from its first payment
//! month up to the last month seen in the payments table. Monthly payments and
//! payment method pricing are then left-joined onto that grid and the commission
//! metrics derived.

use crate::calendar::require_timestamp;
use crate::error::{PipelineError, Result};
use crate::metrics::{MetricDeriver, PaymentColumns};
use crate::record::{FieldValue, NormalizedDataset, NormalizedRecord};
use crate::utils::{month_start, month_starts_in_range};
use chrono::NaiveDate;
use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CONSUMER: &str = "payment panel";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentPanelKeys {
    #[schemars(description = "Organization key, present in organizations and payments")]
    pub customer_id: String,

    #[schemars(description = "Organization column holding the date of its first payment")]
    pub first_payment_date: String,

    #[schemars(description = "Payments column holding the month a payment row covers")]
    pub payment_month: String,

    #[schemars(description = "Payment method key, present in payments and payment methods")]
    pub payment_method_id: String,
}

impl Default for PaymentPanelKeys {
    fn default() -> Self {
        Self {
            customer_id: "customer_id".to_string(),
            first_payment_date: "first_payment_date".to_string(),
            payment_month: "payment_month".to_string(),
            payment_method_id: "payment_method_id".to_string(),
        }
    }
}

pub struct PaymentPanelBuilder {
    keys: PaymentPanelKeys,
    deriver: MetricDeriver,
}

impl Default for PaymentPanelBuilder {
    fn default() -> Self {
        Self::new(PaymentPanelKeys::default(), &PaymentColumns::default())
    }
}

impl PaymentPanelBuilder {
    pub fn new(keys: PaymentPanelKeys, columns: &PaymentColumns) -> Self {
        Self {
            keys,
            deriver: MetricDeriver::payments(columns),
        }
    }

    pub fn build(
        &self,
        organizations: &NormalizedDataset,
        methods: &NormalizedDataset,
        payments: &NormalizedDataset,
    ) -> Result<NormalizedDataset> {
        let keys = &self.keys;
        organizations.require_column(&keys.customer_id, CONSUMER)?;
        organizations.require_column(&keys.first_payment_date, CONSUMER)?;
        payments.require_column(&keys.customer_id, CONSUMER)?;
        payments.require_column(&keys.payment_month, CONSUMER)?;
        payments.require_column(&keys.payment_method_id, CONSUMER)?;
        methods.require_column(&keys.payment_method_id, CONSUMER)?;

        let payment_columns: Vec<String> = payments
            .columns()
            .iter()
            .filter(|c| **c != keys.customer_id && **c != keys.payment_month)
            .cloned()
            .collect();
        let method_columns: Vec<String> = methods
            .columns()
            .iter()
            .filter(|c| **c != keys.payment_method_id)
            .cloned()
            .collect();

        let columns = merged_columns(
            organizations.columns(),
            &keys.payment_month,
            &payment_columns,
            &method_columns,
        )?;

        let mut payment_fill = fill_template(payments, &payment_columns);
        payment_fill.insert(keys.payment_method_id.clone(), FieldValue::Null);
        let method_fill = fill_template(methods, &method_columns);

        let mut payment_index: BTreeMap<(String, NaiveDate), Vec<&NormalizedRecord>> =
            BTreeMap::new();
        for (row, payment) in payments.records().iter().enumerate() {
            let month = month_start(
                require_timestamp(payment.get(&keys.payment_month), &keys.payment_month, row)?
                    .date(),
            );
            let customer = payment[&keys.customer_id].key_string();
            payment_index.entry((customer, month)).or_default().push(payment);
        }

        let months = match (
            payment_index.keys().map(|(_, m)| *m).min(),
            payment_index.keys().map(|(_, m)| *m).max(),
        ) {
            (Some(first), Some(last)) => month_starts_in_range(first, last),
            _ => Vec::new(),
        };

        let mut method_index: BTreeMap<String, Vec<&NormalizedRecord>> = BTreeMap::new();
        for method in methods.records() {
            method_index
                .entry(method[&keys.payment_method_id].key_string())
                .or_default()
                .push(method);
        }

        let mut records = Vec::new();
        for (row, organization) in organizations.records().iter().enumerate() {
            if organization[&keys.first_payment_date].is_null() {
                warn!(
                    "Organization in row {} has no first payment date; left out of the panel",
                    row
                );
                continue;
            }
            let first_month = month_start(
                require_timestamp(
                    organization.get(&keys.first_payment_date),
                    &keys.first_payment_date,
                    row,
                )?
                .date(),
            );
            let customer = organization[&keys.customer_id].key_string();

            for month in months.iter().filter(|m| **m >= first_month) {
                let mut base = organization.clone();
                base.insert(keys.payment_month.clone(), FieldValue::Date(*month));

                let matched: Vec<Option<&NormalizedRecord>> =
                    match payment_index.get(&(customer.clone(), *month)) {
                        Some(rows) => rows.iter().copied().map(Some).collect(),
                        None => vec![None],
                    };

                for payment in matched {
                    let mut with_payment = base.clone();
                    match payment {
                        Some(p) => {
                            for column in &payment_columns {
                                with_payment.insert(column.clone(), p[column].clone());
                            }
                        }
                        None => with_payment.extend(payment_fill.clone()),
                    }

                    let method_rows = match &with_payment[&keys.payment_method_id] {
                        FieldValue::Null => None,
                        key => method_index.get(&key.key_string()),
                    };

                    match method_rows {
                        Some(rows) => {
                            for method in rows {
                                let mut joined = with_payment.clone();
                                for column in &method_columns {
                                    joined.insert(column.clone(), method[column].clone());
                                }
                                records.push(joined);
                            }
                        }
                        None => {
                            let mut joined = with_payment;
                            joined.extend(method_fill.clone());
                            records.push(joined);
                        }
                    }
                }
            }
        }

        let panel = NormalizedDataset::new(columns, records)?;
        let derived = self.deriver.derive(&panel)?;

        info!(
            "Payment panel built: {} organizations over {} months into {} rows",
            organizations.len(),
            months.len(),
            derived.len()
        );

        Ok(derived)
    }
}

fn merged_columns(
    organization_columns: &[String],
    payment_month: &str,
    payment_columns: &[String],
    method_columns: &[String],
) -> Result<Vec<String>> {
    let mut origin: BTreeMap<String, &str> = BTreeMap::new();
    let mut columns = Vec::new();

    let sources = organization_columns
        .iter()
        .map(|c| (c.as_str(), "organizations"))
        .chain(std::iter::once((payment_month, "payments")))
        .chain(payment_columns.iter().map(|c| (c.as_str(), "payments")))
        .chain(method_columns.iter().map(|c| (c.as_str(), "payment methods")));

    for (column, table) in sources {
        if let Some(first) = origin.get(column) {
            return Err(PipelineError::ColumnCollision {
                canonical: column.to_string(),
                first: format!("{}.{}", first, column),
                second: format!("{}.{}", table, column),
            });
        }
        origin.insert(column.to_string(), table);
        columns.push(column.to_string());
    }

    Ok(columns)
}

/// Null substitutes for unmatched joins, shaped after the source table's first row.
/// An empty source table falls back to numeric zeros.
fn fill_template(source: &NormalizedDataset, columns: &[String]) -> BTreeMap<String, FieldValue> {
    columns
        .iter()
        .map(|column| {
            let fill = source
                .records()
                .first()
                .and_then(|r| r.get(column))
                .map(FieldValue::empty_like)
                .unwrap_or(FieldValue::Number(0.0));
            (column.clone(), fill)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{FIXED_RATE_COMMISSION, TOTAL_COMMISSION, VARIABLE_RATE_COMMISSION};

    fn dataset(columns: &[&str], rows: Vec<Vec<FieldValue>>) -> NormalizedDataset {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let records: Vec<NormalizedRecord> = rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect();
        NormalizedDataset::new(columns, records).unwrap()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn num(n: f64) -> FieldValue {
        FieldValue::Number(n)
    }

    fn organizations() -> NormalizedDataset {
        dataset(
            &["customer_id", "first_payment_date", "country"],
            vec![
                vec![num(1.0), text("2023-01-15"), text("Nl")],
                vec![num(2.0), text("2023-02-03"), text("De")],
            ],
        )
    }

    fn methods() -> NormalizedDataset {
        dataset(
            &["payment_method_id", "method_name", "fixed_rate", "variable_rate"],
            vec![
                vec![num(10.0), text("Ideal"), num(0.29), num(0.0)],
                vec![num(20.0), text("Card"), num(0.25), num(0.018)],
            ],
        )
    }

    fn payments() -> NormalizedDataset {
        dataset(
            &[
                "customer_id",
                "payment_month",
                "payment_method_id",
                "total_transactions",
                "total_volume",
            ],
            vec![
                vec![num(1.0), text("2023-01-01"), num(10.0), num(100.0), num(5000.0)],
                vec![num(1.0), text("2023-03-01"), num(10.0), num(50.0), num(2000.0)],
                vec![num(1.0), text("2023-03-01"), num(20.0), num(10.0), num(1000.0)],
                vec![num(2.0), text("2023-03-01"), num(20.0), num(40.0), num(4000.0)],
            ],
        )
    }

    #[test]
    fn test_panel_covers_months_from_first_payment() {
        let panel = PaymentPanelBuilder::default()
            .build(&organizations(), &methods(), &payments())
            .unwrap();

        // customer 1: Jan (1 row), Feb (empty), Mar (2 rows); customer 2: Feb (empty), Mar (1 row)
        assert_eq!(panel.len(), 6);

        let customer_two: Vec<&NormalizedRecord> = panel
            .records()
            .iter()
            .filter(|r| r["customer_id"] == num(2.0))
            .collect();
        assert_eq!(customer_two.len(), 2);
        assert_eq!(
            customer_two[0]["payment_month"],
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap())
        );
    }

    #[test]
    fn test_unmatched_months_are_zero_filled() {
        let panel = PaymentPanelBuilder::default()
            .build(&organizations(), &methods(), &payments())
            .unwrap();

        let february = panel
            .records()
            .iter()
            .find(|r| {
                r["customer_id"] == num(1.0)
                    && r["payment_month"]
                        == FieldValue::Date(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap())
            })
            .unwrap();

        assert_eq!(february["total_transactions"], num(0.0));
        assert_eq!(february["method_name"], text(""));
        assert!(february["payment_method_id"].is_null());
        assert_eq!(february[TOTAL_COMMISSION], num(0.0));
    }

    #[test]
    fn test_commissions_use_joined_method_rates() {
        let panel = PaymentPanelBuilder::default()
            .build(&organizations(), &methods(), &payments())
            .unwrap();

        let card = panel
            .records()
            .iter()
            .find(|r| r["customer_id"] == num(2.0) && r["method_name"] == text("Card"))
            .unwrap();

        let fixed = card[FIXED_RATE_COMMISSION].as_f64().unwrap();
        let variable = card[VARIABLE_RATE_COMMISSION].as_f64().unwrap();
        let total = card[TOTAL_COMMISSION].as_f64().unwrap();
        assert!((fixed - 10.0).abs() < 1e-9);
        assert!((variable - 72.0).abs() < 1e-9);
        assert!((total - 82.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlapping_columns_rejected() {
        let methods = dataset(
            &["payment_method_id", "country", "fixed_rate", "variable_rate"],
            vec![vec![num(10.0), text("Nl"), num(0.29), num(0.0)]],
        );

        let err = PaymentPanelBuilder::default()
            .build(&organizations(), &methods, &payments())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ColumnCollision { canonical, .. } if canonical == "country"));
    }
}
