use crate::aggregation::WeeklyAggregation;
use crate::error::Result;
use crate::layout::GridLayout;
use crate::ranking::{RankedCategoryList, SeriesRanker};
use crate::schema::{ChartRequest, ShowBy};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub iso_week: u32,
    pub week_end: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    pub metric: String,
    pub label: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPanel {
    pub category: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub lines: Vec<ChartLine>,
}

/// Everything an external renderer needs for one weekly chart request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub show_by: ShowBy,
    pub ranked: RankedCategoryList,
    pub layout: GridLayout,
    /// One panel per ranked category, in ranked order.
    pub panels: Vec<ChartPanel>,
}

impl ChartData {
    pub fn panel(&self, category: &str) -> Option<&ChartPanel> {
        self.panels.iter().find(|p| p.category == category)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn build_chart(aggregation: &WeeklyAggregation, request: &ChartRequest) -> Result<ChartData> {
    let ranked = SeriesRanker::rank(aggregation, request.show_by);
    let layout = GridLayout::plan(&ranked.categories(), request.columns)?;

    let (mode, axis_suffix, line_suffix) = match request.show_by {
        ShowBy::Percentage => ("Percentage", " %", " %"),
        ShowBy::Absolute => ("Absolute", "", " Abs"),
    };

    let panels: Vec<ChartPanel> = ranked
        .categories()
        .into_iter()
        .map(|category| {
            let lines = aggregation
                .metrics
                .iter()
                .map(|metric| ChartLine {
                    metric: metric.clone(),
                    label: format!("{}{}", metric, line_suffix),
                    points: aggregation
                        .series_for(category)
                        .filter_map(|entry| {
                            entry.metrics.get(metric).map(|share| SeriesPoint {
                                iso_week: entry.iso_week,
                                week_end: entry.week_end,
                                value: share.value_for(request.show_by),
                            })
                        })
                        .collect(),
                })
                .collect();

            ChartPanel {
                category: category.to_string(),
                title: format!("Category: {} - {} {}", category, request.y_label, mode),
                x_label: "Week Number".to_string(),
                y_label: format!("{}{}", request.y_label, axis_suffix),
                lines,
            }
        })
        .collect();

    info!(
        "Chart for '{}' planned with {} panels on a {}x{} grid",
        aggregation.category_field,
        panels.len(),
        layout.rows,
        layout.columns
    );

    Ok(ChartData {
        show_by: request.show_by,
        ranked,
        layout,
        panels,
    })
}
