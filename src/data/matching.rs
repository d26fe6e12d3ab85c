use log::{debug, info};

use super::model::{FeatureRow, FeatureTable, Peak, RowId, SampleId};
use super::tolerance::Tolerance;

// ---------------------------------------------------------------------------
// Input: detected features of one sample
// ---------------------------------------------------------------------------

/// All features detected in one sample, in detection order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFeatures {
    pub sample: SampleId,
    pub peaks: Vec<Peak>,
}

impl SampleFeatures {
    pub fn new(sample: impl Into<SampleId>, peaks: Vec<Peak>) -> Self {
        SampleFeatures {
            sample: sample.into(),
            peaks,
        }
    }
}

// ---------------------------------------------------------------------------
// Greedy anchor-first alignment
// ---------------------------------------------------------------------------

/// Retention-time and m/z tolerances used when matching features to rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTolerances {
    pub rt: Tolerance,
    pub mz: Tolerance,
}

impl MatchTolerances {
    /// Both tolerances accept `peak` against the row's current averages.
    fn accepts(&self, row: &FeatureRow, peak: &Peak) -> bool {
        self.rt.check(row.average_rt(), peak.measurement.retention_time)
            && self.mz.check(row.average_mz(), peak.measurement.mz)
    }
}

/// Build an aligned table from per-sample feature lists.
///
/// Samples are processed in the order given. Each feature joins the *first*
/// row, in table order, whose average RT and m/z both accept it and that does
/// not already hold a peak from the same sample; otherwise it seeds a new row.
/// The result therefore depends on sample order but is fully deterministic for
/// a fixed order.
pub fn align(name: &str, samples: &[SampleFeatures], tolerances: MatchTolerances) -> FeatureTable {
    let sample_order: Vec<SampleId> = samples.iter().map(|s| s.sample.clone()).collect();
    let mut table = FeatureTable::new(name, sample_order);
    let mut next_id = 1u32;

    for (i, sample) in samples.iter().enumerate() {
        let mut matched = 0usize;
        let mut created = 0usize;

        for peak in &sample.peaks {
            // The first sample has nothing to match against: every feature seeds a row.
            let target = if i == 0 {
                None
            } else {
                table.rows_mut().iter_mut().find(|row| {
                    row.peak(&sample.sample).is_none() && tolerances.accepts(row, peak)
                })
            };

            match target {
                Some(row) => {
                    let added = row.add_peak(sample.sample.clone(), peak.clone());
                    debug_assert!(
                        added.is_ok(),
                        "search returned row {} already holding sample {}",
                        row.id(),
                        sample.sample
                    );
                    matched += 1;
                }
                None => {
                    let id = RowId(next_id);
                    next_id += 1;
                    table.push_row(FeatureRow::new(id, sample.sample.clone(), peak.clone()));
                    created += 1;
                }
            }
        }

        debug!(
            "sample {}: {} features, {matched} matched, {created} new rows",
            sample.sample,
            sample.peaks.len()
        );
    }

    info!(
        "aligned {} samples into {} rows (RT {}, m/z {})",
        samples.len(),
        table.len(),
        tolerances.rt,
        tolerances.mz
    );
    table
}
