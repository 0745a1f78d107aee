use crate::aggregation::{WeeklyAggregation, WeeklyAggregator};
use crate::calendar::enrich_calendar;
use crate::chart::{build_chart, ChartData};
use crate::error::{PipelineError, Result};
use crate::metrics::MetricDeriver;
use crate::normalizer::ColumnNormalizer;
use crate::record::{NormalizedDataset, NormalizedRecord, RawRecord, RawValue};
use crate::sanitizer::FieldSanitizer;
use crate::schema::{ChartRequest, PipelineConfig};
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Runs the cleaning stages for one configuration. Every stage returns a new
/// dataset; a failure anywhere aborts the batch.
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: ColumnNormalizer,
    deriver: MetricDeriver,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let deriver = MetricDeriver::new(config.metrics.clone());
        Self {
            config,
            normalizer: ColumnNormalizer::default(),
            deriver,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Canonical names, declared-type validation and cell cleaning.
    pub fn normalize(&self, raw: &[RawRecord]) -> Result<NormalizedDataset> {
        let types = &self.config.column_types;

        let Some(first) = raw.first() else {
            warn!("No raw records supplied; returning the declared schema with no rows");
            let columns = types.iter().map(|(c, _)| c.to_string()).collect();
            return NormalizedDataset::new(columns, Vec::new());
        };

        let mapping = self.normalizer.normalize_all(first.columns())?;

        let mut kinds = Vec::with_capacity(mapping.len());
        for (raw_name, canonical) in mapping.iter() {
            let kind = types
                .get(canonical)
                .ok_or_else(|| PipelineError::UndeclaredColumn(canonical.to_string()))?;
            kinds.push((raw_name, canonical, kind));
        }
        let present: BTreeSet<&str> = mapping.iter().map(|(_, c)| c).collect();
        if let Some((declared, _)) = types.iter().find(|(c, _)| !present.contains(c)) {
            return Err(PipelineError::MissingColumn(declared.to_string()));
        }

        debug!(
            "Column mapping: {}",
            mapping
                .iter()
                .map(|(r, c)| format!("'{}' -> {}", r, c))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let sanitizer = FieldSanitizer::new(&self.config.rules);
        let null = RawValue::Null;
        let mut records = Vec::with_capacity(raw.len());

        for (row, record) in raw.iter().enumerate() {
            if let Some(extra) = record.columns().find(|c| !mapping.contains_raw(c)) {
                return Err(PipelineError::UnexpectedColumn {
                    column: extra.to_string(),
                    row,
                });
            }

            let mut cleaned = NormalizedRecord::new();
            for (raw_name, canonical, kind) in &kinds {
                let value = record.get(raw_name).unwrap_or(&null);
                cleaned.insert(
                    canonical.to_string(),
                    sanitizer.sanitize(*kind, value, canonical, row)?,
                );
            }
            records.push(cleaned);
        }

        let dataset = NormalizedDataset::new(mapping.canonical_names(), records)?;
        info!(
            "Normalized {} records into {} canonical columns",
            dataset.len(),
            dataset.columns().len()
        );
        Ok(dataset)
    }

    /// Normalization, then calendar attributes and derived metrics when configured.
    pub fn process(&self, raw: &[RawRecord]) -> Result<NormalizedDataset> {
        let mut dataset = self.normalize(raw)?;

        if let Some(timestamp_column) = &self.config.timestamp_column {
            dataset = enrich_calendar(&dataset, timestamp_column)?;
        }

        if !self.deriver.definitions().is_empty() {
            dataset = self.deriver.derive(&dataset)?;
        }

        Ok(dataset)
    }

    pub fn aggregate(
        &self,
        dataset: &NormalizedDataset,
        request: &ChartRequest,
    ) -> Result<WeeklyAggregation> {
        WeeklyAggregator::new(request.week_end.weekday()).aggregate(
            dataset,
            &request.category_field,
            &request.metrics,
        )
    }

    pub fn weekly_chart(
        &self,
        dataset: &NormalizedDataset,
        request: &ChartRequest,
    ) -> Result<ChartData> {
        let aggregation = self.aggregate(dataset, request)?;
        build_chart(&aggregation, request)
    }
}
