use crate::aggregation::WeeklyAggregation;
use crate::schema::ShowBy;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCategory {
    pub category: String,
    pub statistic: f64,
}

/// Categories ordered by descending summary statistic, ties by name ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedCategoryList {
    entries: Vec<RankedCategory>,
}

impl RankedCategoryList {
    pub fn from_statistics(statistics: &BTreeMap<String, f64>) -> Self {
        let mut entries: Vec<RankedCategory> = statistics
            .iter()
            .map(|(category, statistic)| RankedCategory {
                category: category.clone(),
                statistic: *statistic,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.statistic
                .total_cmp(&a.statistic)
                .then_with(|| a.category.cmp(&b.category))
        });

        Self { entries }
    }

    pub fn entries(&self) -> &[RankedCategory] {
        &self.entries
    }

    pub fn categories(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.category.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct SeriesRanker;

impl SeriesRanker {
    pub fn rank(aggregation: &WeeklyAggregation, show_by: ShowBy) -> RankedCategoryList {
        RankedCategoryList::from_statistics(&aggregation.summary_statistics(show_by))
    }
}
