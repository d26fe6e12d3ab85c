use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::data::model::{FeatureRow, FragmentSpectrum};
use crate::error::ExportError;

use super::{format_number, RowWriter};

/// Writes one `BEGIN IONS`/`END IONS` block per row that has a non-empty
/// MS/MS spectrum. Every block is written and flushed before the next row.
pub struct MgfRowWriter<W: Write = File> {
    path: PathBuf,
    out: W,
    blocks: usize,
}

impl MgfRowWriter<File> {
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = File::create(path).map_err(|source| ExportError::Io {
            row: None,
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_writer(file, path))
    }
}

impl<W: Write> MgfRowWriter<W> {
    /// `path` only labels errors.
    pub fn from_writer(out: W, path: &Path) -> Self {
        MgfRowWriter {
            path: path.to_path_buf(),
            out,
            blocks: 0,
        }
    }

    /// Number of ion blocks written so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

/// Render the ion block for `row`. Retention time is written in seconds.
pub fn ion_block(row: &FeatureRow, spectrum: &FragmentSpectrum) -> String {
    let mut block = String::new();
    let id = row.id();
    // Writing into a String cannot fail.
    let _ = writeln!(block, "BEGIN IONS");
    let _ = writeln!(block, "FEATURE_ID={id}");
    let _ = writeln!(block, "PEPMASS={}", format_number(row.average_mz()));
    let _ = writeln!(block, "SCANS={id}");
    let _ = writeln!(block, "RTINSECONDS={}", format_number(row.average_rt() * 60.0));
    let _ = writeln!(block, "MSLEVEL=2");
    for (mz, intensity) in spectrum.mz.iter().zip(&spectrum.intensity) {
        let _ = writeln!(block, "{} {}", format_number(*mz), format_number(*intensity));
    }
    let _ = writeln!(block, "END IONS");
    let _ = writeln!(block);
    block
}

impl<W: Write> RowWriter for MgfRowWriter<W> {
    fn write_row(
        &mut self,
        row: &FeatureRow,
        spectrum: Option<&FragmentSpectrum>,
    ) -> Result<(), ExportError> {
        let Some(spectrum) = spectrum.filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let block = ion_block(row, spectrum);
        self.out
            .write_all(block.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|source| ExportError::Io {
                row: Some(row.id()),
                path: self.path.clone(),
                source,
            })?;
        self.blocks += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>, ExportError> {
        debug!("{} ion blocks in {}", self.blocks, self.path.display());
        self.out.flush().map_err(|source| ExportError::Io {
            row: None,
            path: self.path.clone(),
            source,
        })?;
        Ok(vec![self.path.clone()])
    }
}
