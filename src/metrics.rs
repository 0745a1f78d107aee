use crate::error::{PipelineError, Result};
use crate::record::{FieldValue, NormalizedDataset, NormalizedRecord};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::{Add, Mul, Sub};

pub const REVENUE_BEFORE_DISCOUNT: &str = "revenue_before_discount";
pub const REVENUE_AFTER_DISCOUNT: &str = "revenue_after_discount";
pub const PROFIT_BEFORE_WASTE: &str = "profit_before_waste";
pub const WASTE_COST: &str = "waste_cost";
pub const PROFIT_AFTER_WASTE: &str = "profit_after_waste";

pub const FIXED_RATE_COMMISSION: &str = "fixed_rate_commission";
pub const VARIABLE_RATE_COMMISSION: &str = "variable_rate_commission";
pub const TOTAL_COMMISSION: &str = "total_commission";

/// Arithmetic over numeric record fields.
///
/// Build formulas with the operators: `Formula::field("a") * Formula::field("b")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    Field(String),
    Constant(f64),
    Add(Box<Formula>, Box<Formula>),
    Sub(Box<Formula>, Box<Formula>),
    Mul(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn field(name: impl Into<String>) -> Self {
        Formula::Field(name.into())
    }

    pub fn evaluate(&self, record: &NormalizedRecord, metric: &str, row: usize) -> Result<f64> {
        match self {
            Formula::Field(name) => {
                let value = record.get(name).ok_or_else(|| PipelineError::MissingField {
                    consumer: format!("metric '{}'", metric),
                    field: name.clone(),
                })?;
                value.as_f64().ok_or_else(|| PipelineError::NonNumericField {
                    field: name.clone(),
                    row,
                })
            }
            Formula::Constant(c) => Ok(*c),
            Formula::Add(a, b) => Ok(a.evaluate(record, metric, row)? + b.evaluate(record, metric, row)?),
            Formula::Sub(a, b) => Ok(a.evaluate(record, metric, row)? - b.evaluate(record, metric, row)?),
            Formula::Mul(a, b) => Ok(a.evaluate(record, metric, row)? * b.evaluate(record, metric, row)?),
        }
    }

    pub fn referenced_fields(&self) -> Vec<&str> {
        match self {
            Formula::Field(name) => vec![name.as_str()],
            Formula::Constant(_) => Vec::new(),
            Formula::Add(a, b) | Formula::Sub(a, b) | Formula::Mul(a, b) => {
                let mut fields = a.referenced_fields();
                fields.extend(b.referenced_fields());
                fields
            }
        }
    }
}

impl Add for Formula {
    type Output = Formula;

    fn add(self, rhs: Formula) -> Formula {
        Formula::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Formula {
    type Output = Formula;

    fn sub(self, rhs: Formula) -> Formula {
        Formula::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Formula {
    type Output = Formula;

    fn mul(self, rhs: Formula) -> Formula {
        Formula::Mul(Box::new(self), Box::new(rhs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricDefinition {
    #[schemars(description = "Name of the derived column")]
    pub name: String,
    pub formula: Formula,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, formula: Formula) -> Self {
        Self {
            name: name.into(),
            formula,
        }
    }
}

/// Canonical source columns for the retail formulas. Real exports carry longer
/// names (`price_before_discount_includ_vat_eur`), so each one is bindable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetailColumns {
    pub price_before_discount: String,
    pub discount_value: String,
    pub unit_cost: String,
    pub units_sold: String,
    pub wasted_units: String,
}

impl Default for RetailColumns {
    fn default() -> Self {
        Self {
            price_before_discount: "price_before_discount".to_string(),
            discount_value: "discount_value".to_string(),
            unit_cost: "unit_cost".to_string(),
            units_sold: "units_sold".to_string(),
            wasted_units: "wasted_units".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentColumns {
    pub total_transactions: String,
    pub fixed_rate: String,
    pub total_volume: String,
    pub variable_rate: String,
}

impl Default for PaymentColumns {
    fn default() -> Self {
        Self {
            total_transactions: "total_transactions".to_string(),
            fixed_rate: "fixed_rate".to_string(),
            total_volume: "total_volume".to_string(),
            variable_rate: "variable_rate".to_string(),
        }
    }
}

pub fn retail_metrics(columns: &RetailColumns) -> Vec<MetricDefinition> {
    let price = || Formula::field(&columns.price_before_discount);
    let discount = || Formula::field(&columns.discount_value);
    let cost = || Formula::field(&columns.unit_cost);
    let sold = || Formula::field(&columns.units_sold);
    let wasted = || Formula::field(&columns.wasted_units);

    vec![
        MetricDefinition::new(REVENUE_BEFORE_DISCOUNT, price() * sold()),
        MetricDefinition::new(REVENUE_AFTER_DISCOUNT, (price() - discount()) * sold()),
        MetricDefinition::new(
            PROFIT_BEFORE_WASTE,
            Formula::field(REVENUE_AFTER_DISCOUNT) - cost() * sold(),
        ),
        MetricDefinition::new(WASTE_COST, wasted() * cost()),
        MetricDefinition::new(
            PROFIT_AFTER_WASTE,
            Formula::field(PROFIT_BEFORE_WASTE) - Formula::field(WASTE_COST),
        ),
    ]
}

pub fn payment_metrics(columns: &PaymentColumns) -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            FIXED_RATE_COMMISSION,
            Formula::field(&columns.total_transactions) * Formula::field(&columns.fixed_rate),
        ),
        MetricDefinition::new(
            VARIABLE_RATE_COMMISSION,
            Formula::field(&columns.total_volume) * Formula::field(&columns.variable_rate),
        ),
        MetricDefinition::new(
            TOTAL_COMMISSION,
            Formula::field(FIXED_RATE_COMMISSION) + Formula::field(VARIABLE_RATE_COMMISSION),
        ),
    ]
}

/// Applies an ordered list of metric definitions; later metrics may read earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MetricDeriver {
    definitions: Vec<MetricDefinition>,
}

impl MetricDeriver {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        Self { definitions }
    }

    pub fn retail(columns: &RetailColumns) -> Self {
        Self::new(retail_metrics(columns))
    }

    pub fn payments(columns: &PaymentColumns) -> Self {
        Self::new(payment_metrics(columns))
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    /// Checks every formula against the dataset's columns before any row is touched.
    pub fn validate(&self, dataset: &NormalizedDataset) -> Result<()> {
        let mut available: BTreeSet<&str> = dataset.columns().iter().map(String::as_str).collect();

        for definition in &self.definitions {
            if let Some(missing) = definition
                .formula
                .referenced_fields()
                .into_iter()
                .find(|f| !available.contains(f))
            {
                return Err(PipelineError::MissingField {
                    consumer: format!("metric '{}'", definition.name),
                    field: missing.to_string(),
                });
            }
            available.insert(definition.name.as_str());
        }

        Ok(())
    }

    pub fn derive(&self, dataset: &NormalizedDataset) -> Result<NormalizedDataset> {
        self.validate(dataset)?;

        let names: Vec<String> = self.definitions.iter().map(|d| d.name.clone()).collect();

        let derived = dataset.extend_with(&names, |row, record| {
            let mut working = record.clone();
            let mut values = Vec::with_capacity(self.definitions.len());

            for definition in &self.definitions {
                let value = definition.formula.evaluate(&working, &definition.name, row)?;
                working.insert(definition.name.clone(), FieldValue::Number(value));
                values.push(FieldValue::Number(value));
            }

            Ok(values)
        })?;

        info!(
            "Derived {} metrics for {} records",
            self.definitions.len(),
            derived.len()
        );

        Ok(derived)
    }
}
