//! # Sales Share Pipeline
//!
//! A library for turning raw retail and payment exports into clean, typed record sets
//! and weekly per-category share series ready for charting.
//!
//! ## Core Concepts
//!
//! - **Canonical columns**: raw headers such as `"Price before discount [EUR]"` are mapped
//!   to lowercase identifiers (`price_before_discount`) and checked against declared types
//! - **Cleaning rules**: a declarative table decides how text and numeric cells are cleaned
//!   and what replaces missing values
//! - **Derived metrics**: revenue, profit and commission fields expressed as formulas
//! - **Weekly shares**: per-category weekly sums divided by the weekly total across all
//!   categories, ranked and laid out on a subplot grid
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_share_pipeline::*;
//!
//! let types = ColumnTypes::new()
//!     .with("time", ColumnKind::Timestamp)
//!     .with("category", ColumnKind::Text)
//!     .with("price_before_discount", ColumnKind::Numeric)
//!     .with("discount_value", ColumnKind::Numeric)
//!     .with("unit_cost", ColumnKind::Numeric)
//!     .with("units_sold", ColumnKind::Numeric)
//!     .with("wasted_units", ColumnKind::Numeric);
//! let config = PipelineConfig::retail(types, "time", &RetailColumns::default());
//!
//! let raw = read_raw_records_from_path("sales.csv")?;
//! let dataset = process_records(&config, &raw)?;
//!
//! let request = ChartRequest::new("category", &["revenue_after_discount"], "Revenue");
//! let chart = weekly_chart(&dataset, &request)?;
//! println!("{}", chart.to_json()?);
//! ```

pub mod aggregation;
pub mod calendar;
pub mod chart;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod layout;
pub mod metrics;
pub mod normalizer;
pub mod payments;
pub mod ranking;
pub mod record;
pub mod sanitizer;
pub mod schema;
pub mod utils;

pub use aggregation::{CategoryWeekSeries, MetricShare, WeeklyAggregation, WeeklyAggregator};
pub use calendar::{enrich_calendar, DATE_FIELD, DAY_NAME_FIELD, DAY_OF_MONTH_FIELD, WEEKDAY_FIELD};
pub use chart::{build_chart, ChartData, ChartLine, ChartPanel, SeriesPoint};
pub use engine::Pipeline;
pub use error::{PipelineError, Result, Stage};
pub use ingestion::*;
pub use layout::GridLayout;
pub use metrics::*;
pub use normalizer::{ColumnMapping, ColumnNormalizer};
pub use payments::{PaymentPanelBuilder, PaymentPanelKeys};
pub use ranking::{RankedCategory, RankedCategoryList, SeriesRanker};
pub use record::*;
pub use sanitizer::*;
pub use schema::*;

use log::info;

/// Cleans one batch of raw records with `config`: canonical columns, cleaned cells,
/// calendar attributes and derived metrics.
pub fn process_records(config: &PipelineConfig, raw: &[RawRecord]) -> Result<NormalizedDataset> {
    info!(
        "Processing {} raw records against {} declared columns",
        raw.len(),
        config.column_types.len()
    );
    Pipeline::new(config.clone()).process(raw)
}

/// Weekly share chart for an already normalized dataset.
pub fn weekly_chart(dataset: &NormalizedDataset, request: &ChartRequest) -> Result<ChartData> {
    let aggregation = WeeklyAggregator::new(request.week_end.weekday()).aggregate(
        dataset,
        &request.category_field,
        &request.metrics,
    )?;
    build_chart(&aggregation, request)
}
