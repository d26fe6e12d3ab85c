use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, ListArray, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A compound eluting at a fixed position; each sample sees a jittered copy.
struct Compound {
    rt: f64,
    mz: f64,
    abundance: f64,
}

/// Detected features of one sample, in the column layout the loader reads.
#[derive(Default)]
struct Columns {
    sample: Vec<String>,
    rt: Vec<f64>,
    mz: Vec<f64>,
    height: Vec<f64>,
    area: Vec<f64>,
    ms2_mz: Vec<Option<Vec<f64>>>,
    ms2_intensity: Vec<Option<Vec<f64>>>,
}

fn fragment_spectrum(precursor: f64, rng: &mut StdRng) -> (Vec<f64>, Vec<f64>) {
    let count = rng.gen_range(3..12);
    let mut mz: Vec<f64> = (0..count)
        .map(|_| rng.gen_range(50.0..precursor))
        .collect();
    mz.sort_by(|a, b| a.total_cmp(b));
    let intensity = mz.iter().map(|_| rng.gen_range(1.0..100.0)).collect();
    (mz, intensity)
}

fn list_array(values: &[Option<Vec<f64>>]) -> ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for entry in values {
        match entry {
            Some(list) => {
                builder.values().append_slice(list);
                builder.append(true);
            }
            None => builder.append(false),
        }
    }
    builder.finish()
}

fn main() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);

    let compounds: Vec<Compound> = (0..200)
        .map(|_| Compound {
            rt: rng.gen_range(0.5..25.0),
            mz: rng.gen_range(100.0..1200.0),
            abundance: 10f64.powf(rng.gen_range(3.0..7.0)),
        })
        .collect();

    let samples = ["Control_1", "Control_2", "Treated_1", "Treated_2"];
    let mut cols = Columns::default();

    for (s, sample) in samples.iter().enumerate() {
        let treated = s >= 2;
        for (c, compound) in compounds.iter().enumerate() {
            // Not every compound is detected in every sample.
            if rng.gen_bool(0.15) {
                continue;
            }
            // A tenth of the compounds respond to treatment.
            let fold = if treated && c % 10 == 0 { 4.0 } else { 1.0 };
            let height = compound.abundance * fold * rng.gen_range(0.8..1.2);
            let mz = compound.mz + rng.gen_range(-0.002..0.002);

            cols.sample.push(sample.to_string());
            cols.rt.push(compound.rt + rng.gen_range(-0.02..0.02));
            cols.mz.push(mz);
            cols.height.push(height);
            cols.area.push(height * rng.gen_range(0.15..0.25));
            if rng.gen_bool(0.4) {
                let (frag_mz, frag_intensity) = fragment_spectrum(mz, &mut rng);
                cols.ms2_mz.push(Some(frag_mz));
                cols.ms2_intensity.push(Some(frag_intensity));
            } else {
                cols.ms2_mz.push(None);
                cols.ms2_intensity.push(None);
            }
        }
    }

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("sample", DataType::Utf8, false),
        Field::new("rt", DataType::Float64, false),
        Field::new("mz", DataType::Float64, false),
        Field::new("height", DataType::Float64, false),
        Field::new("area", DataType::Float64, false),
        Field::new("ms2_mz", DataType::List(item.clone()), true),
        Field::new("ms2_intensity", DataType::List(item), true),
    ]));

    let rows = cols.sample.len();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(cols.sample)),
            Arc::new(Float64Array::from(cols.rt)),
            Arc::new(Float64Array::from(cols.mz)),
            Arc::new(Float64Array::from(cols.height)),
            Arc::new(Float64Array::from(cols.area)),
            Arc::new(list_array(&cols.ms2_mz)),
            Arc::new(list_array(&cols.ms2_intensity)),
        ],
    )
    .context("building record batch")?;

    let output_path = "sample_features.parquet";
    let file = std::fs::File::create(output_path)
        .with_context(|| format!("creating {output_path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {rows} features from {} samples ({} compounds) to {output_path}",
        samples.len(),
        compounds.len()
    );
    Ok(())
}
