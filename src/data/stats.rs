use std::fmt;

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{FeatureRow, FeatureTable, Measurement, RowId, SampleId};

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Arithmetic mean. An empty slice yields NaN; callers guard against it.
pub fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// `log2(mean(group_a) / mean(group_b))`.
///
/// Returns NaN when `mean(group_b)` is exactly zero. Callers treat NaN as
/// unplottable.
pub fn log_ratio(group_a: &[f64], group_b: &[f64]) -> f64 {
    let avg_b = average(group_b);
    if avg_b == 0.0 {
        return f64::NAN;
    }
    (average(group_a) / avg_b).log2()
}

/// Which measurement field comparative statistics run over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Area,
    Height,
}

impl Metric {
    pub fn value(self, m: &Measurement) -> f64 {
        match self {
            Metric::Area => m.area,
            Metric::Height => m.intensity,
        }
    }

    fn plural(self) -> &'static str {
        match self {
            Metric::Area => "areas",
            Metric::Height => "heights",
        }
    }
}

/// Selected metric of every present measurement of `row` among `samples`.
pub fn group_values(row: &FeatureRow, samples: &[SampleId], metric: Metric) -> Vec<f64> {
    samples
        .iter()
        .filter_map(|s| row.measurement(s))
        .map(|m| metric.value(m))
        .collect()
}

// ---------------------------------------------------------------------------
// Log-ratio RT/MZ view
// ---------------------------------------------------------------------------

/// One plotted feature: position in the RT/MZ plane, coloured by log-ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRatioPoint {
    pub row: RowId,
    pub rt: f64,
    pub mz: f64,
    /// NaN when group two averages to zero.
    pub log_ratio: f64,
}

/// Log-ratio of group averages for every row detected in both groups.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRatioDataset {
    title: String,
    points: Vec<LogRatioPoint>,
}

impl LogRatioDataset {
    /// Rows missing from either group are left out entirely; they get no
    /// placeholder point.
    pub fn build(
        table: &FeatureTable,
        group_one: &[SampleId],
        group_two: &[SampleId],
        metric: Metric,
    ) -> Self {
        let title = format!(
            "Logratio analysis (Logratio of average peak {} in {} vs. {} files)",
            metric.plural(),
            group_one.len(),
            group_two.len()
        );
        debug!("computing {title}");

        let points = table
            .rows()
            .iter()
            .filter_map(|row| {
                let one = group_values(row, group_one, metric);
                let two = group_values(row, group_two, metric);
                if one.is_empty() || two.is_empty() {
                    return None;
                }
                Some(LogRatioPoint {
                    row: row.id(),
                    rt: row.average_rt(),
                    mz: row.average_mz(),
                    log_ratio: log_ratio(&one, &two),
                })
            })
            .collect();

        LogRatioDataset { title, points }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn points(&self) -> &[LogRatioPoint] {
        &self.points
    }

    /// Points a plot can draw (finite log-ratio).
    pub fn plottable(&self) -> impl Iterator<Item = &LogRatioPoint> {
        self.points.iter().filter(|p| p.log_ratio.is_finite())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl fmt::Display for LogRatioDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}
