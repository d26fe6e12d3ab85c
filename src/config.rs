use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filter::RowFilter;
use crate::data::matching::{MatchTolerances, SampleFeatures};
use crate::data::model::SampleId;
use crate::data::tolerance::{Tolerance, ToleranceRecord};
use crate::error::ConfigError;
use crate::export::template::NameTemplate;
use crate::export::{ExportFormat, ExportSettings};

// ---------------------------------------------------------------------------
// Parameter file
// ---------------------------------------------------------------------------

/// JSON parameter file as written by users or saved from a previous run.
///
/// ```json
/// {
///   "rt_tolerance": { "type": "absolute", "value": "0.05" },
///   "mz_tolerance": { "type": "percent",  "value": "0.001" },
///   "sample_order": ["s1", "s2"],
///   "export": { "filename": "out_{}.csv", "format": "csv", "filter": "all" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub rt_tolerance: ToleranceRecord,
    pub mz_tolerance: ToleranceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_order: Option<Vec<String>>,
    pub export: ExportParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParameters {
    pub filename: String,
    pub format: ExportFormat,
    pub filter: RowFilter,
}

impl Default for ExportParameters {
    fn default() -> Self {
        ExportParameters {
            filename: "{}.csv".to_string(),
            format: ExportFormat::Csv,
            filter: RowFilter::All,
        }
    }
}

impl Parameters {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {}", path.display()))?;
        serde_json::from_str(&text).context("parsing parameter file")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing parameters")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing parameter file {}", path.display()))
    }

    /// Both tolerances, or the first one that is missing or malformed.
    pub fn tolerances(&self) -> Result<MatchTolerances, ConfigError> {
        let mut rt: Option<Tolerance> = None;
        let mut mz: Option<Tolerance> = None;
        self.rt_tolerance.load_into(&mut rt)?;
        self.mz_tolerance.load_into(&mut mz)?;
        Ok(MatchTolerances {
            rt: rt.ok_or(ConfigError::Unset("Retention time tolerance"))?,
            mz: mz.ok_or(ConfigError::Unset("m/z tolerance"))?,
        })
    }

    pub fn export_settings(&self) -> Result<ExportSettings, ConfigError> {
        Ok(ExportSettings {
            template: NameTemplate::parse(&self.export.filename)?,
            format: self.export.format,
            filter: self.export.filter,
        })
    }
}

/// Reorder loaded samples to the configured processing order.
///
/// Without an explicit order, file order is kept. An explicit order must name
/// every loaded sample exactly once.
pub fn apply_sample_order(
    samples: Vec<SampleFeatures>,
    order: Option<&[String]>,
) -> Result<Vec<SampleFeatures>, ConfigError> {
    let Some(order) = order else {
        return Ok(samples);
    };
    if order.len() != samples.len() {
        return Err(ConfigError::SampleOrderMismatch {
            given: order.len(),
            expected: samples.len(),
        });
    }

    let mut pool: Vec<Option<SampleFeatures>> = samples.into_iter().map(Some).collect();
    order
        .iter()
        .map(|name| {
            pool.iter_mut()
                .find(|slot| matches!(slot, Some(s) if s.sample.as_str() == name))
                .and_then(Option::take)
                .ok_or_else(|| ConfigError::UnknownSample(name.clone()))
        })
        .collect()
}

/// Resolve sample names against the table's samples.
pub fn resolve_samples(names: &[String], known: &[SampleId]) -> Result<Vec<SampleId>, ConfigError> {
    names
        .iter()
        .map(|name| {
            known
                .iter()
                .find(|s| s.as_str() == name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownSample(name.clone()))
        })
        .collect()
}
