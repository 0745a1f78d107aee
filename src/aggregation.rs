//! Weekly per-category aggregation and percentage shares.
//!
//! The algorithm runs in a fixed order for one invocation:
//!
//! 1. sum each metric per (date, category);
//! 2. resample the daily sums into weekly totals across all categories;
//! 3. resample each category's daily sums into its own weekly values;
//! 4. merge the two on the week-ending date and divide.
//!
//! Weekly buckets are labelled by their last day. Both resampling steps cover a
//! contiguous run of weeks: the totals span the first to the last active week of
//! the dataset, each category spans its own first to last active week, and the
//! weeks in between carry zeros.

use crate::calendar::{parse_timestamp, DATE_FIELD};
use crate::error::{PipelineError, Result};
use crate::record::NormalizedDataset;
use crate::schema::ShowBy;
use crate::utils::{mean, week_ending, week_endings_in_range};
use chrono::{Datelike, NaiveDate, Weekday};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricShare {
    /// Category's summed value for the week.
    pub value: f64,
    /// Sum over every category for the same week.
    pub weekly_total: f64,
    /// `value / weekly_total * 100`, or zero when the total is zero.
    pub share_pct: f64,
}

impl MetricShare {
    fn new(value: f64, weekly_total: f64) -> Self {
        let share_pct = if weekly_total == 0.0 {
            0.0
        } else {
            value / weekly_total * 100.0
        };
        Self {
            value,
            weekly_total,
            share_pct,
        }
    }

    pub fn value_for(&self, show_by: ShowBy) -> f64 {
        match show_by {
            ShowBy::Percentage => self.share_pct,
            ShowBy::Absolute => self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryWeekSeries {
    pub category: String,
    pub week_end: NaiveDate,
    /// ISO week number of `week_end`.
    pub iso_week: u32,
    pub metrics: BTreeMap<String, MetricShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAggregation {
    pub category_field: String,
    pub metrics: Vec<String>,
    pub week_end: Weekday,
    /// Week-ending date to per-metric total across categories.
    pub weekly_totals: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
    /// Sorted by category, then week.
    pub entries: Vec<CategoryWeekSeries>,
}

impl WeeklyAggregation {
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.entries.iter().map(|e| e.category.as_str()).collect();
        categories.dedup();
        categories
    }

    pub fn series_for<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CategoryWeekSeries> + 'a {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// One scalar per category used to order the chart panels.
    ///
    /// `Percentage`: mean share over every week and metric.
    /// `Absolute`: per-metric mean of the weekly values, averaged across metrics.
    pub fn summary_statistics(&self, show_by: ShowBy) -> BTreeMap<String, f64> {
        let mut statistics = BTreeMap::new();

        for category in self.categories() {
            let per_metric: Vec<f64> = self
                .metrics
                .iter()
                .map(|metric| {
                    let values: Vec<f64> = self
                        .series_for(category)
                        .filter_map(|e| e.metrics.get(metric))
                        .map(|share| share.value_for(show_by))
                        .collect();
                    mean(&values)
                })
                .collect();

            statistics.insert(category.to_string(), mean(&per_metric));
        }

        statistics
    }
}

pub struct WeeklyAggregator {
    week_end: Weekday,
}

impl Default for WeeklyAggregator {
    fn default() -> Self {
        Self::new(Weekday::Sun)
    }
}

impl WeeklyAggregator {
    pub fn new(week_end: Weekday) -> Self {
        Self { week_end }
    }

    pub fn aggregate(
        &self,
        dataset: &NormalizedDataset,
        category_field: &str,
        metrics: &[String],
    ) -> Result<WeeklyAggregation> {
        if metrics.is_empty() {
            return Err(PipelineError::NoMetricsRequested);
        }

        dataset.require_column(DATE_FIELD, "weekly aggregation")?;
        dataset.require_column(category_field, "weekly aggregation")?;
        for metric in metrics {
            dataset.require_column(metric, "weekly aggregation")?;
        }

        let daily = self.sum_by_date_and_category(dataset, category_field, metrics)?;
        let weekly_totals = self.resample_totals(&daily, metrics.len());
        let category_weeks = self.resample_categories(&daily, metrics.len());

        let mut entries = Vec::new();
        for (category, weeks) in category_weeks {
            for (week_end, values) in weeks {
                let totals = weekly_totals
                    .get(&week_end)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; metrics.len()]);

                let mut shares = BTreeMap::new();
                for (idx, metric) in metrics.iter().enumerate() {
                    if totals[idx] == 0.0 {
                        debug!(
                            "Weekly total for '{}' is zero in week ending {}; share set to 0",
                            metric, week_end
                        );
                    }
                    shares.insert(metric.clone(), MetricShare::new(values[idx], totals[idx]));
                }

                entries.push(CategoryWeekSeries {
                    category: category.clone(),
                    week_end,
                    iso_week: week_end.iso_week().week(),
                    metrics: shares,
                });
            }
        }

        let weekly_totals: BTreeMap<NaiveDate, BTreeMap<String, f64>> = weekly_totals
            .into_iter()
            .map(|(week, totals)| (week, metrics.iter().cloned().zip(totals).collect()))
            .collect();

        info!(
            "Aggregated {} records into {} weeks and {} category-week entries by '{}'",
            dataset.len(),
            weekly_totals.len(),
            entries.len(),
            category_field
        );

        Ok(WeeklyAggregation {
            category_field: category_field.to_string(),
            metrics: metrics.to_vec(),
            week_end: self.week_end,
            weekly_totals,
            entries,
        })
    }

    fn sum_by_date_and_category(
        &self,
        dataset: &NormalizedDataset,
        category_field: &str,
        metrics: &[String],
    ) -> Result<BTreeMap<(NaiveDate, String), Vec<f64>>> {
        let mut daily: BTreeMap<(NaiveDate, String), Vec<f64>> = BTreeMap::new();
        let mut uncategorized = 0usize;

        for (row, record) in dataset.records().iter().enumerate() {
            let date = record
                .get(DATE_FIELD)
                .and_then(|v| v.as_date().or_else(|| parse_timestamp(v).map(|t| t.date())))
                .ok_or_else(|| PipelineError::InvalidTimestamp {
                    field: DATE_FIELD.to_string(),
                    row,
                    details: "not a date".to_string(),
                })?;

            let category = record
                .get(category_field)
                .map(|v| v.key_string())
                .unwrap_or_default();
            if category.is_empty() {
                uncategorized += 1;
            }

            let sums = daily
                .entry((date, category))
                .or_insert_with(|| vec![0.0; metrics.len()]);

            for (idx, metric) in metrics.iter().enumerate() {
                let value = record
                    .get(metric)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| PipelineError::NonNumericField {
                        field: metric.clone(),
                        row,
                    })?;
                sums[idx] += value;
            }
        }

        if uncategorized > 0 {
            warn!(
                "{} records have an empty '{}'; they are kept as their own category",
                uncategorized, category_field
            );
        }

        Ok(daily)
    }

    fn resample_totals(
        &self,
        daily: &BTreeMap<(NaiveDate, String), Vec<f64>>,
        metric_count: usize,
    ) -> BTreeMap<NaiveDate, Vec<f64>> {
        let mut totals: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();

        for ((date, _), values) in daily {
            let bucket = totals
                .entry(week_ending(*date, self.week_end))
                .or_insert_with(|| vec![0.0; metric_count]);
            for (sum, value) in bucket.iter_mut().zip(values) {
                *sum += value;
            }
        }

        fill_week_gaps(totals, metric_count)
    }

    fn resample_categories(
        &self,
        daily: &BTreeMap<(NaiveDate, String), Vec<f64>>,
        metric_count: usize,
    ) -> BTreeMap<String, BTreeMap<NaiveDate, Vec<f64>>> {
        let mut by_category: BTreeMap<String, BTreeMap<NaiveDate, Vec<f64>>> = BTreeMap::new();

        for ((date, category), values) in daily {
            let bucket = by_category
                .entry(category.clone())
                .or_default()
                .entry(week_ending(*date, self.week_end))
                .or_insert_with(|| vec![0.0; metric_count]);
            for (sum, value) in bucket.iter_mut().zip(values) {
                *sum += value;
            }
        }

        by_category
            .into_iter()
            .map(|(category, weeks)| (category, fill_week_gaps(weeks, metric_count)))
            .collect()
    }
}

fn fill_week_gaps(
    mut weeks: BTreeMap<NaiveDate, Vec<f64>>,
    metric_count: usize,
) -> BTreeMap<NaiveDate, Vec<f64>> {
    let first = weeks.keys().next().copied();
    let last = weeks.keys().next_back().copied();

    if let (Some(first), Some(last)) = (first, last) {
        for week in week_endings_in_range(first, last) {
            weeks.entry(week).or_insert_with(|| vec![0.0; metric_count]);
        }
    }
    weeks
}
