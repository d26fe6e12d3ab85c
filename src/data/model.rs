use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Name of one raw sample (one acquired data file).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(pub String);

impl SampleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SampleId {
    fn from(s: String) -> Self {
        SampleId(s)
    }
}

impl From<&str> for SampleId {
    fn from(s: &str) -> Self {
        SampleId(s.to_string())
    }
}

/// Identity of an aligned row. Assigned in creation order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u32);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Measurement – one sample's observation of a feature
// ---------------------------------------------------------------------------

/// Retention time is in minutes, `intensity` is the peak height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub retention_time: f64,
    pub mz: f64,
    pub intensity: f64,
    pub area: f64,
}

/// Fragmentation (MS/MS) spectrum recorded for a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpectrum {
    pub precursor_mz: f64,
    /// Fragment m/z values.
    pub mz: Vec<f64>,
    /// Fragment intensities – same length as `mz`.
    pub intensity: Vec<f64>,
}

impl FragmentSpectrum {
    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// A measurement together with its optional secondary evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub measurement: Measurement,
    pub fragmentation: Option<Arc<FragmentSpectrum>>,
}

impl Peak {
    pub fn new(measurement: Measurement) -> Self {
        Peak {
            measurement,
            fragmentation: None,
        }
    }

    pub fn with_fragmentation(mut self, spectrum: FragmentSpectrum) -> Self {
        self.fragmentation = Some(Arc::new(spectrum));
        self
    }
}

// ---------------------------------------------------------------------------
// FeatureRow – one aligned feature across samples
// ---------------------------------------------------------------------------

/// One chemical feature observed in one or more samples.
///
/// A row is always created from a single peak and peaks are only ever added,
/// so a row can never hold zero measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    id: RowId,
    peaks: BTreeMap<SampleId, Peak>,
    average_rt: f64,
    average_mz: f64,
}

impl FeatureRow {
    pub fn new(id: RowId, sample: SampleId, peak: Peak) -> Self {
        let average_rt = peak.measurement.retention_time;
        let average_mz = peak.measurement.mz;
        let mut peaks = BTreeMap::new();
        peaks.insert(sample, peak);
        FeatureRow {
            id,
            peaks,
            average_rt,
            average_mz,
        }
    }

    /// Attach a sample's peak and recompute the averages.
    ///
    /// Returns the peak back if the sample is already present in this row.
    pub(crate) fn add_peak(&mut self, sample: SampleId, peak: Peak) -> Result<(), Peak> {
        if self.peaks.contains_key(&sample) {
            return Err(peak);
        }
        self.peaks.insert(sample, peak);
        self.recompute_averages();
        Ok(())
    }

    fn recompute_averages(&mut self) {
        let n = self.peaks.len() as f64;
        let (rt_sum, mz_sum) = self
            .peaks
            .values()
            .fold((0.0, 0.0), |(rt, mz), p| {
                (rt + p.measurement.retention_time, mz + p.measurement.mz)
            });
        self.average_rt = rt_sum / n;
        self.average_mz = mz_sum / n;
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn average_rt(&self) -> f64 {
        self.average_rt
    }

    pub fn average_mz(&self) -> f64 {
        self.average_mz
    }

    /// The measurement recorded for `sample`, or `None` if the feature was not
    /// detected in that sample.
    pub fn measurement(&self, sample: &SampleId) -> Option<&Measurement> {
        self.peaks.get(sample).map(|p| &p.measurement)
    }

    pub fn peak(&self, sample: &SampleId) -> Option<&Peak> {
        self.peaks.get(sample)
    }

    /// Present peaks, keyed by sample.
    pub fn peaks(&self) -> impl Iterator<Item = (&SampleId, &Peak)> {
        self.peaks.iter()
    }

    /// Number of samples in which this feature was detected (always ≥ 1).
    pub fn detected_count(&self) -> usize {
        self.peaks.len()
    }

    pub fn has_fragmentation(&self) -> bool {
        self.peaks.values().any(|p| p.fragmentation.is_some())
    }

    /// Fragment spectrum of the most intense peak that carries one.
    ///
    /// `sample_order` breaks intensity ties: the earlier sample wins.
    pub fn best_fragmentation(&self, sample_order: &[SampleId]) -> Option<&FragmentSpectrum> {
        let mut best: Option<&Peak> = None;
        for sample in sample_order {
            let Some(peak) = self.peaks.get(sample) else {
                continue;
            };
            if peak.fragmentation.is_none() {
                continue;
            }
            match best {
                Some(b) if b.measurement.intensity >= peak.measurement.intensity => {}
                _ => best = Some(peak),
            }
        }
        best.and_then(|p| p.fragmentation.as_deref())
    }
}

// ---------------------------------------------------------------------------
// FeatureTable – the aligned feature table
// ---------------------------------------------------------------------------

/// Ordered collection of aligned rows plus the sample order they refer to.
///
/// Built once by matching and then treated as immutable; share it as
/// [`SharedTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    name: String,
    samples: Vec<SampleId>,
    rows: Vec<FeatureRow>,
    row_index: HashMap<RowId, usize>,
}

/// Frozen, reference-counted table snapshot handed to views and exporters.
pub type SharedTable = Arc<FeatureTable>;

impl FeatureTable {
    pub fn new(name: impl Into<String>, samples: Vec<SampleId>) -> Self {
        FeatureTable {
            name: name.into(),
            samples,
            rows: Vec::new(),
            row_index: HashMap::new(),
        }
    }

    pub(crate) fn push_row(&mut self, row: FeatureRow) {
        debug_assert!(row.detected_count() > 0, "row {} has no measurements", row.id);
        debug_assert!(
            row.peaks.keys().all(|s| self.samples.contains(s)),
            "row {} references a sample outside the table",
            row.id
        );
        self.row_index.insert(row.id, self.rows.len());
        self.rows.push(row);
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [FeatureRow] {
        &mut self.rows
    }

    /// Drop a row from the table. Remaining rows keep their relative order.
    pub fn remove_row(&mut self, id: RowId) -> Option<FeatureRow> {
        let idx = self.row_index.remove(&id)?;
        let row = self.rows.remove(idx);
        for (i, r) in self.rows.iter().enumerate().skip(idx) {
            self.row_index.insert(r.id, i);
        }
        Some(row)
    }

    /// Display name, substituted into export filename templates.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&FeatureRow> {
        self.row_index.get(&id).map(|&i| &self.rows[i])
    }

    /// Rows in which `sample` was detected, in table order.
    pub fn rows_with_sample<'a>(
        &'a self,
        sample: &'a SampleId,
    ) -> impl Iterator<Item = &'a FeatureRow> + 'a {
        self.rows.iter().filter(move |r| r.peaks.contains_key(sample))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_shared(self) -> SharedTable {
        Arc::new(self)
    }
}
