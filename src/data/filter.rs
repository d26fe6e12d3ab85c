use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::model::{FeatureRow, FeatureTable};

// ---------------------------------------------------------------------------
// Row filter: which rows qualify for preview and export
// ---------------------------------------------------------------------------

/// Row selection shared by the interactive preview and the exporters.
///
/// Evaluation is pure, so both see exactly the same rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RowFilter {
    /// Every row.
    #[default]
    All,
    /// Rows with a fragmentation spectrum on at least one measurement.
    OnlyWithMs2,
}

impl RowFilter {
    pub fn accepts(self, row: &FeatureRow) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::OnlyWithMs2 => row.has_fragmentation(),
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowFilter::All => write!(f, "ALL"),
            RowFilter::OnlyWithMs2 => write!(f, "ONLY WITH MS2"),
        }
    }
}

/// Indices (table order) of rows the filter accepts.
pub fn filtered_indices(table: &FeatureTable, filter: RowFilter) -> Vec<usize> {
    table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| filter.accepts(row))
        .map(|(i, _)| i)
        .collect()
}

/// Rows the filter accepts, in table order.
pub fn accepted_rows(table: &FeatureTable, filter: RowFilter) -> impl Iterator<Item = &FeatureRow> {
    table.rows().iter().filter(move |row| filter.accepts(row))
}
