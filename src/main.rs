use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};

use rusty_aligner::config::{apply_sample_order, resolve_samples, Parameters};
use rusty_aligner::data::filter::RowFilter;
use rusty_aligner::data::loader::load_file;
use rusty_aligner::data::matching::align;
use rusty_aligner::data::stats::Metric;
use rusty_aligner::data::tolerance::ToleranceRecord;
use rusty_aligner::export::task::{run_in_background, TaskStatus};
use rusty_aligner::export::ExportFormat;
use rusty_aligner::state::AnalysisState;

/// Align detected LC-MS features across samples and export the feature table.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Detected features (.csv, .json or .parquet)
    input: PathBuf,

    /// JSON parameter file
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Retention time tolerance (minutes, or percent with --rt-percent)
    #[arg(long)]
    rt_tolerance: Option<String>,
    #[arg(long)]
    rt_percent: bool,

    /// m/z tolerance (absolute, or percent with --mz-percent)
    #[arg(long)]
    mz_tolerance: Option<String>,
    #[arg(long)]
    mz_percent: bool,

    /// Output filename; "{}" is replaced by the table name
    #[arg(short, long)]
    output: Option<String>,

    #[arg(long, value_enum)]
    format: Option<ExportFormat>,

    #[arg(long, value_enum)]
    filter: Option<RowFilter>,

    /// Display name of the aligned table
    #[arg(long, default_value = "Aligned feature list")]
    name: String,

    /// Comma-separated samples of the first log-ratio group
    #[arg(long, value_delimiter = ',')]
    group_one: Vec<String>,

    /// Comma-separated samples of the second log-ratio group
    #[arg(long, value_delimiter = ',')]
    group_two: Vec<String>,

    #[arg(long, value_enum, default_value_t = Metric::Area)]
    metric: Metric,

    /// Write the effective parameters to this file
    #[arg(long)]
    save_params: Option<PathBuf>,
}

fn tolerance_override(value: Option<&String>, percent: bool) -> Option<ToleranceRecord> {
    value.map(|v| ToleranceRecord {
        kind: if percent { "percent" } else { "absolute" }.to_string(),
        value: v.clone(),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut params = match &args.params {
        Some(path) => Parameters::load(path)?,
        None => Parameters::default(),
    };
    if let Some(rt) = tolerance_override(args.rt_tolerance.as_ref(), args.rt_percent) {
        params.rt_tolerance = rt;
    }
    if let Some(mz) = tolerance_override(args.mz_tolerance.as_ref(), args.mz_percent) {
        params.mz_tolerance = mz;
    }
    if let Some(output) = &args.output {
        params.export.filename = output.clone();
    }
    if let Some(format) = args.format {
        params.export.format = format;
    }
    if let Some(filter) = args.filter {
        params.export.filter = filter;
    }

    // Validate everything before touching any file.
    let tolerances = params.tolerances()?;
    let settings = params.export_settings()?;

    let samples = load_file(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let samples = apply_sample_order(samples, params.sample_order.as_deref())?;
    let sample_ids: Vec<_> = samples.iter().map(|s| s.sample.clone()).collect();
    let group_one = resolve_samples(&args.group_one, &sample_ids)?;
    let group_two = resolve_samples(&args.group_two, &sample_ids)?;

    if let Some(path) = &args.save_params {
        params.save(path)?;
    }

    let table = align(&args.name, &samples, tolerances).into_shared();

    let mut state = AnalysisState::default();
    state.set_table(table);
    state.set_filter(settings.filter);
    state.set_metric(args.metric);
    state.set_groups(group_one, group_two);
    info!(
        "{} of {} rows pass filter {}",
        state.visible_indices.len(),
        state.table.as_ref().map_or(0, |t| t.len()),
        state.filter
    );
    if let Some(view) = &state.log_ratio {
        info!(
            "{view}: {} rows, {} plottable",
            view.len(),
            view.plottable().count()
        );
    }

    let Some(task) = state.export_task(settings) else {
        bail!("no aligned table to export");
    };
    let handle = task.handle();
    let finished = run_in_background(task, Duration::from_millis(50), |fraction| {
        debug!("export {:.0}%", fraction * 100.0)
    });
    let Some(status) = finished else {
        bail!("export worker panicked while {}", handle.status());
    };

    match status {
        TaskStatus::Error => bail!(
            "{}",
            handle
                .error_message()
                .unwrap_or_else(|| "export failed".to_string())
        ),
        status => {
            info!("export {status}");
            Ok(())
        }
    }
}
