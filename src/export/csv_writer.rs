use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::data::model::{FeatureRow, FragmentSpectrum, RowId, SampleId};
use crate::error::ExportError;

use super::{format_number, RowWriter};

// ---------------------------------------------------------------------------
// Column layouts
// ---------------------------------------------------------------------------

/// Which per-sample columns a CSV export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Height and area for every sample.
    Full,
    /// Area only, as expected by feature-based molecular networking.
    Quantification,
}

impl CsvLayout {
    fn header(self, samples: &[SampleId]) -> Vec<String> {
        let mut header: Vec<String> = vec![
            "row ID".into(),
            "row m/z".into(),
            "row retention time".into(),
        ];
        if self == CsvLayout::Full {
            header.push("number of detected peaks".into());
        }
        for sample in samples {
            if self == CsvLayout::Full {
                header.push(format!("{sample} Peak height"));
            }
            header.push(format!("{sample} Peak area"));
        }
        header
    }

    fn record(self, row: &FeatureRow, samples: &[SampleId]) -> Vec<String> {
        let mut record = vec![
            row.id().to_string(),
            format_number(row.average_mz()),
            format_number(row.average_rt()),
        ];
        if self == CsvLayout::Full {
            record.push(row.detected_count().to_string());
        }
        for sample in samples {
            let m = row.measurement(sample);
            if self == CsvLayout::Full {
                record.push(m.map(|m| format_number(m.intensity)).unwrap_or_default());
            }
            record.push(m.map(|m| format_number(m.area)).unwrap_or_default());
        }
        record
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Encode one record as a complete CSV line.
fn encode(record: &[String]) -> Result<Vec<u8>, csv::Error> {
    let mut encoder = csv::Writer::from_writer(Vec::new());
    encoder.write_record(record)?;
    encoder
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Writes one CSV line per exported row. Existing files are overwritten.
///
/// Each line is encoded in memory, then written and flushed on its own, so a
/// failure is attributed to the row whose bytes did not reach the output.
pub struct CsvRowWriter<W: Write = File> {
    path: PathBuf,
    layout: CsvLayout,
    samples: Vec<SampleId>,
    out: W,
}

impl CsvRowWriter<File> {
    pub fn create(path: &Path, layout: CsvLayout, samples: &[SampleId]) -> Result<Self, ExportError> {
        let file = File::create(path).map_err(|source| ExportError::Io {
            row: None,
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_writer(file, path, layout, samples)
    }
}

impl<W: Write> CsvRowWriter<W> {
    /// Write the header to `out`; `path` only labels errors.
    pub fn from_writer(
        out: W,
        path: &Path,
        layout: CsvLayout,
        samples: &[SampleId],
    ) -> Result<Self, ExportError> {
        let mut writer = CsvRowWriter {
            path: path.to_path_buf(),
            layout,
            samples: samples.to_vec(),
            out,
        };
        writer.put(&layout.header(samples), None)?;
        Ok(writer)
    }

    fn put(&mut self, record: &[String], row: Option<RowId>) -> Result<(), ExportError> {
        let line = encode(record).map_err(|source| ExportError::Csv {
            row,
            path: self.path.clone(),
            source,
        })?;
        self.out
            .write_all(&line)
            .and_then(|()| self.out.flush())
            .map_err(|source| ExportError::Io {
                row,
                path: self.path.clone(),
                source,
            })
    }
}

impl<W: Write> RowWriter for CsvRowWriter<W> {
    fn write_row(
        &mut self,
        row: &FeatureRow,
        _spectrum: Option<&FragmentSpectrum>,
    ) -> Result<(), ExportError> {
        let record = self.layout.record(row, &self.samples);
        self.put(&record, Some(row.id()))
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>, ExportError> {
        self.out.flush().map_err(|source| ExportError::Io {
            row: None,
            path: self.path.clone(),
            source,
        })?;
        Ok(vec![self.path.clone()])
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::data::model::{Measurement, Peak};

    /// Accepts `budget` write calls, then fails every later one.
    struct FailingWriter {
        budget: usize,
        written: Vec<u8>,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.budget -= 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn row() -> FeatureRow {
        let mut r = FeatureRow::new(
            RowId(7),
            "a".into(),
            Peak::new(Measurement {
                retention_time: 5.0,
                mz: 200.1,
                intensity: 10.0,
                area: 1000.0,
            }),
        );
        r.add_peak(
            "c".into(),
            Peak::new(Measurement {
                retention_time: 5.02,
                mz: 200.11,
                intensity: 5.0,
                area: 500.5,
            }),
        )
        .unwrap();
        r
    }

    #[test]
    fn test_full_layout_leaves_absent_samples_empty() {
        let samples: Vec<SampleId> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            CsvLayout::Full.header(&samples),
            vec![
                "row ID",
                "row m/z",
                "row retention time",
                "number of detected peaks",
                "a Peak height",
                "a Peak area",
                "b Peak height",
                "b Peak area",
                "c Peak height",
                "c Peak area",
            ]
        );
        let record = CsvLayout::Full.record(&row(), &samples);
        assert_eq!(record[0], "7");
        assert_eq!(record[3], "2");
        assert_eq!(&record[4..], &["10", "1000", "", "", "5", "500.5"]);
    }

    #[test]
    fn test_quantification_layout() {
        let samples: Vec<SampleId> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            CsvLayout::Quantification.header(&samples),
            vec!["row ID", "row m/z", "row retention time", "a Peak area", "b Peak area", "c Peak area"]
        );
        let record = CsvLayout::Quantification.record(&row(), &samples);
        assert_eq!(&record[3..], &["1000", "", "500.5"]);
    }

    #[test]
    fn test_each_row_reaches_the_output_before_the_next() {
        let samples: Vec<SampleId> = vec!["a".into(), "c".into()];
        let out = FailingWriter {
            budget: usize::MAX,
            written: Vec::new(),
        };
        let mut w = CsvRowWriter::from_writer(out, Path::new("mem.csv"), CsvLayout::Quantification, &samples)
            .unwrap();
        let text = String::from_utf8(w.out.written.clone()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec!["row ID,row m/z,row retention time,a Peak area,c Peak area"]
        );

        w.write_row(&row(), None).unwrap();
        let text = String::from_utf8(w.out.written.clone()).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert!(line.starts_with("7,"));
        assert!(line.ends_with(",1000,500.5"));
    }

    #[test]
    fn test_write_failure_names_the_row() {
        let samples: Vec<SampleId> = vec!["a".into(), "c".into()];
        // Header goes through, the first data row does not.
        let out = FailingWriter {
            budget: 1,
            written: Vec::new(),
        };
        let mut w = CsvRowWriter::from_writer(out, Path::new("full.csv"), CsvLayout::Full, &samples)
            .unwrap();
        let err = w.write_row(&row(), None).unwrap_err();
        assert_eq!(err.row(), Some(RowId(7)));
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(err.to_string().contains("full.csv failed at row 7"));
        assert_eq!(w.out.written.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_header_failure_has_no_row() {
        let out = FailingWriter {
            budget: 0,
            written: Vec::new(),
        };
        let err = CsvRowWriter::from_writer(out, Path::new("x.csv"), CsvLayout::Full, &[])
            .err()
            .unwrap();
        assert_eq!(err.row(), None);
    }
}
