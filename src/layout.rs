use crate::error::{PipelineError, Result};
use serde::Serialize;

pub const DEFAULT_COLUMNS: usize = 3;

/// Subplot grid with one slot per ranked category, filled row-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLayout {
    pub rows: usize,
    pub columns: usize,
    /// `rows * columns` slots; trailing slots past the last category are `None`.
    pub slots: Vec<Option<String>>,
}

impl GridLayout {
    pub fn plan<S: AsRef<str>>(categories: &[S], columns: usize) -> Result<Self> {
        if columns == 0 {
            return Err(PipelineError::InvalidColumnCount(columns));
        }

        let rows = categories.len().div_ceil(columns);
        let mut slots: Vec<Option<String>> = categories
            .iter()
            .map(|c| Some(c.as_ref().to_string()))
            .collect();
        slots.resize(rows * columns, None);

        Ok(Self {
            rows,
            columns,
            slots,
        })
    }

    pub fn empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// (row, column) of a flattened slot index.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.columns, index % self.columns)
    }
}
