//! Export layer: serialize the rows a [`RowFilter`] accepts, in table order.
//!
//! ```text
//!   SharedTable ──► filter ──► (merge MS/MS) ──► RowWriter(s) ──► files
//! ```
//!
//! The filter runs before any per-row work. Floats are written with the
//! shortest round-trip representation and nothing time-dependent is emitted,
//! so re-running an export over the same table produces identical bytes.
//! A failed export leaves already-written files in place.

pub mod csv_writer;
pub mod mgf_writer;
pub mod task;
pub mod template;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::filter::{accepted_rows, RowFilter};
use crate::data::model::{FeatureRow, FeatureTable, FragmentSpectrum, SampleId};
use crate::error::ExportError;

use csv_writer::{CsvLayout, CsvRowWriter};
use mgf_writer::MgfRowWriter;
use task::{CancelToken, Progress};
use template::NameTemplate;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// One CSV with heights and areas per sample.
    #[default]
    Csv,
    /// MGF of MS/MS spectra plus a `_quant.csv` area table.
    Gnps,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub template: NameTemplate,
    pub format: ExportFormat,
    pub filter: RowFilter,
}

/// Pluggable MS/MS merging, invoked once per exported row.
///
/// Returning `None` leaves the row without a spectrum in the output.
pub trait SpectraMerger: Send + Sync {
    fn merge(&self, row: &FeatureRow, samples: &[SampleId]) -> Option<FragmentSpectrum>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { rows: usize, files: Vec<PathBuf> },
    Cancelled { rows: usize },
}

/// A destination for exported rows.
pub trait RowWriter {
    fn write_row(
        &mut self,
        row: &FeatureRow,
        spectrum: Option<&FragmentSpectrum>,
    ) -> Result<(), ExportError>;

    /// Flush buffered rows and report the files written.
    fn finish(&mut self) -> Result<Vec<PathBuf>, ExportError>;
}

/// Shortest representation that parses back to the same `f64`.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

/// `dir/name.ext` → `dir/name_quant.csv`.
pub fn quant_table_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.with_extension("").into_os_string();
    name.push("_quant.csv");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn open_writers(
    path: &Path,
    format: ExportFormat,
    samples: &[SampleId],
) -> Result<Vec<Box<dyn RowWriter>>, ExportError> {
    let mut writers: Vec<Box<dyn RowWriter>> = Vec::new();
    match format {
        ExportFormat::Csv => {
            writers.push(Box::new(CsvRowWriter::create(path, CsvLayout::Full, samples)?));
        }
        ExportFormat::Gnps => {
            writers.push(Box::new(MgfRowWriter::create(&path.with_extension("mgf"))?));
            writers.push(Box::new(CsvRowWriter::create(
                &quant_table_path(path),
                CsvLayout::Quantification,
                samples,
            )?));
        }
    }
    Ok(writers)
}

fn finish_all(writers: &mut [Box<dyn RowWriter>]) -> Result<Vec<PathBuf>, ExportError> {
    let mut files = Vec::new();
    for w in writers {
        files.extend(w.finish()?);
    }
    Ok(files)
}

/// Export the accepted rows of `table`.
///
/// Cancellation is honoured between rows: the rows already written are flushed
/// and the partial files are kept.
pub fn export_table(
    table: &FeatureTable,
    settings: &ExportSettings,
    merger: Option<&dyn SpectraMerger>,
    cancel: &CancelToken,
    progress: &Progress,
) -> Result<ExportOutcome, ExportError> {
    let path = settings.template.resolve(table.name());
    let writers = open_writers(&path, settings.format, table.samples())?;
    export_rows(table, settings, writers, merger, cancel, progress)
}

/// Feed the accepted rows of `table` to already opened `writers`.
pub(crate) fn export_rows(
    table: &FeatureTable,
    settings: &ExportSettings,
    mut writers: Vec<Box<dyn RowWriter>>,
    merger: Option<&dyn SpectraMerger>,
    cancel: &CancelToken,
    progress: &Progress,
) -> Result<ExportOutcome, ExportError> {
    let samples = table.samples();
    let rows: Vec<&FeatureRow> = accepted_rows(table, settings.filter).collect();
    progress.start(rows.len());
    debug!(
        "{} of {} rows pass filter {}",
        rows.len(),
        table.len(),
        settings.filter
    );

    let wants_spectra = settings.format == ExportFormat::Gnps;

    for (written, row) in rows.iter().enumerate() {
        if cancel.is_cancelled() {
            finish_all(&mut writers)?;
            return Ok(ExportOutcome::Cancelled { rows: written });
        }

        let merged;
        let spectrum = match (wants_spectra, merger) {
            (false, _) => None,
            (true, Some(m)) => {
                merged = m.merge(row, samples);
                merged.as_ref()
            }
            (true, None) => row.best_fragmentation(samples),
        };

        for w in writers.iter_mut() {
            w.write_row(row, spectrum)?;
        }
        progress.advance();
    }

    let files = finish_all(&mut writers)?;
    Ok(ExportOutcome::Completed {
        rows: rows.len(),
        files,
    })
}
