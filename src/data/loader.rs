use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::matching::SampleFeatures;
use super::model::{FragmentSpectrum, Measurement, Peak};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load detected features for all samples from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – columns `sample`, `rt`, `mz`, `height`, `area`, optional
///   list columns `ms2_mz` / `ms2_intensity`
/// * `.json`    – `[{ "sample": "A", "rt": 5.0, ..., "ms2": {"mz": [...], "intensity": [...]} }, ...]`
/// * `.csv`     – same columns as parquet, `ms2_*` as semicolon-separated floats
///
/// Samples are returned in order of first appearance; features keep file order.
pub fn load_file(path: &Path) -> Result<Vec<SampleFeatures>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let features = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let n_peaks: usize = features.iter().map(|s| s.peaks.len()).sum();
    info!(
        "loaded {n_peaks} features from {} samples ({})",
        features.len(),
        path.display()
    );
    Ok(features)
}

/// Groups features by sample, preserving first-appearance order.
#[derive(Default)]
struct SampleCollector {
    samples: Vec<SampleFeatures>,
}

impl SampleCollector {
    fn push(&mut self, sample: &str, peak: Peak) {
        match self.samples.iter_mut().find(|s| s.sample.as_str() == sample) {
            Some(s) => s.peaks.push(peak),
            None => self.samples.push(SampleFeatures::new(sample, vec![peak])),
        }
    }

    fn finish(self) -> Vec<SampleFeatures> {
        self.samples
    }
}

fn make_peak(measurement: Measurement, ms2: Option<(Vec<f64>, Vec<f64>)>, row: usize) -> Result<Peak> {
    let peak = Peak::new(measurement);
    match ms2 {
        Some((mz, intensity)) if !mz.is_empty() => {
            if mz.len() != intensity.len() {
                bail!(
                    "Row {row}: ms2_mz has {} values but ms2_intensity has {}",
                    mz.len(),
                    intensity.len()
                );
            }
            Ok(peak.with_fragmentation(FragmentSpectrum {
                precursor_mz: measurement.mz,
                mz,
                intensity,
            }))
        }
        _ => Ok(peak),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, one record per detected feature):
///
/// ```json
/// [
///   {
///     "sample": "A",
///     "rt": 5.0, "mz": 200.1, "height": 100.0, "area": 1000.0,
///     "ms2": { "mz": [50.0, 75.0], "intensity": [10.0, 20.0] }
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<SampleFeatures>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut collector = SampleCollector::default();

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let sample = obj
            .get("sample")
            .and_then(|v| v.as_str())
            .with_context(|| format!("Row {i}: missing or invalid 'sample'"))?;

        let measurement = Measurement {
            retention_time: json_f64(obj.get("rt"), i, "rt")?,
            mz: json_f64(obj.get("mz"), i, "mz")?,
            intensity: json_f64(obj.get("height"), i, "height")?,
            area: json_f64(obj.get("area"), i, "area")?,
        };

        let ms2 = match obj.get("ms2") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(ms2)) => Some((
                json_array_to_f64(ms2.get("mz"), i, "ms2.mz")?,
                json_array_to_f64(ms2.get("intensity"), i, "ms2.intensity")?,
            )),
            Some(_) => bail!("Row {i}: 'ms2' must be an object"),
        };

        collector.push(sample, make_peak(measurement, ms2, i)?);
    }

    Ok(collector.finish())
}

fn json_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<f64> {
    val.and_then(|v| v.as_f64())
        .with_context(|| format!("Row {row}: missing or invalid '{col}'"))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names `sample,rt,mz,height,area` and
/// optionally `ms2_mz,ms2_intensity` holding semicolon-separated floats:
///   `"50.0;75.0"`, `"10.0;20.0"`.  An empty cell means no MS/MS.
fn load_csv(path: &Path) -> Result<Vec<SampleFeatures>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("CSV missing '{name}' column"))
    };
    let sample_idx = column("sample")?;
    let rt_idx = column("rt")?;
    let mz_idx = column("mz")?;
    let height_idx = column("height")?;
    let area_idx = column("area")?;
    let ms2_mz_idx = headers.iter().position(|h| h == "ms2_mz");
    let ms2_int_idx = headers.iter().position(|h| h == "ms2_intensity");

    let mut collector = SampleCollector::default();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();
        let number = |idx: usize, col: &str| -> Result<f64> {
            let text = cell(idx);
            text.parse::<f64>()
                .with_context(|| format!("Row {row_no}, {col}: '{text}' is not a number"))
        };

        let measurement = Measurement {
            retention_time: number(rt_idx, "rt")?,
            mz: number(mz_idx, "mz")?,
            intensity: number(height_idx, "height")?,
            area: number(area_idx, "area")?,
        };

        let ms2 = match (ms2_mz_idx, ms2_int_idx) {
            (Some(mi), Some(ii)) if !cell(mi).is_empty() => Some((
                parse_semicolon_floats(cell(mi), row_no, "ms2_mz")?,
                parse_semicolon_floats(cell(ii), row_no, "ms2_intensity")?,
            )),
            _ => None,
        };

        let sample = cell(sample_idx);
        if sample.is_empty() {
            bail!("CSV row {row_no}: empty sample name");
        }
        collector.push(sample, make_peak(measurement, ms2, row_no)?);
    }

    Ok(collector.finish())
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of detected features.
///
/// Expected schema:
/// - `sample`: Utf8 / LargeUtf8
/// - `rt`, `mz`, `height`, `area`: Float64 or Float32
/// - `ms2_mz`, `ms2_intensity` (optional): nullable List<Float64> or LargeList<Float64>
fn load_parquet(path: &Path) -> Result<Vec<SampleFeatures>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut collector = SampleCollector::default();
    let mut offset = 0usize;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        let sample_col = required_column(&batch, "sample")?;
        let rt_col = required_column(&batch, "rt")?;
        let mz_col = required_column(&batch, "mz")?;
        let height_col = required_column(&batch, "height")?;
        let area_col = required_column(&batch, "area")?;
        let ms2_cols = optional_pair(&batch, "ms2_mz", "ms2_intensity");

        for row in 0..batch.num_rows() {
            let row_no = offset + row;
            let sample = extract_string(sample_col, row)
                .with_context(|| format!("Row {row_no}: failed to read 'sample'"))?;
            let measurement = Measurement {
                retention_time: extract_f64(rt_col, row)
                    .with_context(|| format!("Row {row_no}: failed to read 'rt'"))?,
                mz: extract_f64(mz_col, row)
                    .with_context(|| format!("Row {row_no}: failed to read 'mz'"))?,
                intensity: extract_f64(height_col, row)
                    .with_context(|| format!("Row {row_no}: failed to read 'height'"))?,
                area: extract_f64(area_col, row)
                    .with_context(|| format!("Row {row_no}: failed to read 'area'"))?,
            };

            let ms2 = match ms2_cols {
                Some((mz_list, int_list)) if !mz_list.is_null(row) => Some((
                    extract_f64_list(mz_list, row)
                        .with_context(|| format!("Row {row_no}: failed to read 'ms2_mz'"))?,
                    extract_f64_list(int_list, row)
                        .with_context(|| format!("Row {row_no}: failed to read 'ms2_intensity'"))?,
                )),
                _ => None,
            };

            collector.push(&sample, make_peak(measurement, ms2, row_no)?);
        }
        offset += batch.num_rows();
    }

    Ok(collector.finish())
}

// -- Parquet / Arrow helpers --

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn optional_pair<'a>(
    batch: &'a RecordBatch,
    first: &str,
    second: &str,
) -> Option<(&'a Arc<dyn Array>, &'a Arc<dyn Array>)> {
    let schema = batch.schema();
    let a = schema.index_of(first).ok()?;
    let b = schema.index_of(second).ok()?;
    Some((batch.column(a), batch.column(b)))
}

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null sample name");
    }
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            Ok(arr.value(row).to_string())
        }
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected Utf8 column, got {other:?}"),
    }
}

fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null value in numeric column");
    }
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(arr.value(row))
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(arr.value(row) as f64)
    } else {
        bail!("Expected Float64 or Float32 column, got {:?}", col.data_type())
    }
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}
