use std::sync::Arc;

use rusty_aligner::config::Parameters;
use rusty_aligner::data::filter::RowFilter;
use rusty_aligner::data::loader::load_file;
use rusty_aligner::data::matching::{align, MatchTolerances, SampleFeatures};
use rusty_aligner::data::model::{FeatureTable, Measurement, Peak, SampleId};
use rusty_aligner::data::stats::{group_values, log_ratio, LogRatioDataset, Metric};
use rusty_aligner::data::tolerance::Tolerance;
use rusty_aligner::export::task::{ExportTask, TaskStatus};
use rusty_aligner::export::template::NameTemplate;
use rusty_aligner::export::{ExportFormat, ExportSettings};

fn feature(rt: f64, mz: f64, area: f64) -> Peak {
    Peak::new(Measurement {
        retention_time: rt,
        mz,
        intensity: area * 5.0,
        area,
    })
}

fn tolerances() -> MatchTolerances {
    MatchTolerances {
        rt: Tolerance::absolute(0.05).unwrap(),
        mz: Tolerance::absolute(0.02).unwrap(),
    }
}

fn two_samples(second_rt: f64) -> FeatureTable {
    let samples = vec![
        SampleFeatures::new("sample1", vec![feature(5.00, 200.10, 1000.0)]),
        SampleFeatures::new("sample2", vec![feature(second_rt, 200.11, 500.0)]),
    ];
    align("Demo", &samples, tolerances())
}

#[test]
fn matching_features_share_a_row() {
    let table = two_samples(5.02);
    assert_eq!(table.len(), 1);

    let row = &table.rows()[0];
    assert_eq!(row.detected_count(), 2);
    assert!((row.average_rt() - 5.01).abs() < 1e-9);

    let one = group_values(row, &[SampleId::from("sample1")], Metric::Area);
    let two = group_values(row, &[SampleId::from("sample2")], Metric::Area);
    assert_eq!(one, vec![1000.0]);
    assert_eq!(two, vec![500.0]);
    assert_eq!(log_ratio(&one, &two), 1.0);

    let view = LogRatioDataset::build(
        &table,
        &[SampleId::from("sample1")],
        &[SampleId::from("sample2")],
        Metric::Area,
    );
    assert_eq!(view.points()[0].log_ratio, 1.0);
    assert_eq!(
        view.title(),
        "Logratio analysis (Logratio of average peak areas in 1 vs. 1 files)"
    );
}

#[test]
fn feature_outside_rt_window_opens_new_row() {
    let table = two_samples(5.10);
    assert_eq!(table.len(), 2);
    assert!(table.rows().iter().all(|r| r.detected_count() == 1));
}

#[test]
fn alignment_is_reproducible() {
    let a = two_samples(5.02);
    let b = two_samples(5.02);
    assert_eq!(a.rows(), b.rows());
}

fn demo_table() -> FeatureTable {
    let samples = vec![
        SampleFeatures::new(
            "s1",
            vec![
                feature(1.0, 100.0, 10.0),
                feature(2.0, 200.0, 20.0),
                feature(3.0, 300.0, 30.0),
            ],
        ),
        SampleFeatures::new("s2", vec![feature(2.01, 200.005, 25.0)]),
    ];
    align("Demo", &samples, tolerances())
}

#[test]
fn export_all_rows_in_table_order() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = dir.path().join("out_{}.csv");
    let settings = ExportSettings {
        template: NameTemplate::parse(pattern.to_str().unwrap()).unwrap(),
        format: ExportFormat::Csv,
        filter: RowFilter::All,
    };

    let table = demo_table().into_shared();
    let task = ExportTask::new(Arc::clone(&table), settings);
    let handle = task.handle();
    assert_eq!(handle.status(), TaskStatus::Waiting);
    assert_eq!(task.run(), TaskStatus::Finished);
    assert_eq!(handle.status(), TaskStatus::Finished);
    assert_eq!(handle.finished_fraction(), 1.0);

    let path = dir.path().join("out_Demo.csv");
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let ids: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    let expected: Vec<String> = table.rows().iter().map(|r| r.id().to_string()).collect();
    assert_eq!(ids.len(), table.len());
    assert_eq!(ids, expected);
}

#[test]
fn export_runs_on_worker_thread() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = dir.path().join("{}");
    let settings = ExportSettings {
        template: NameTemplate::parse(pattern.to_str().unwrap()).unwrap(),
        format: ExportFormat::Gnps,
        filter: RowFilter::OnlyWithMs2,
    };

    let task = ExportTask::new(demo_table().into_shared(), settings);
    let handle = task.handle();
    let status = std::thread::spawn(move || task.run()).join().unwrap();
    assert_eq!(status, TaskStatus::Finished);
    assert!(handle.status().is_done());

    // No row carries MS/MS, so both files hold headers only.
    let mgf = std::fs::read_to_string(dir.path().join("Demo.mgf")).unwrap();
    assert!(mgf.is_empty());
    let quant = std::fs::read_to_string(dir.path().join("Demo_quant.csv")).unwrap();
    assert_eq!(quant.lines().count(), 1);
}

#[test]
fn csv_feed_to_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("features.csv");
    std::fs::write(
        &input,
        "sample,rt,mz,height,area,ms2_mz,ms2_intensity\n\
         b,5.00,200.10,9000,1000,,\n\
         a,5.02,200.11,4000,500,50;75,10;20\n\
         a,7.50,310.00,100,20,,\n",
    )
    .unwrap();

    let params: Parameters = serde_json::from_str(&format!(
        r#"{{
            "rt_tolerance": {{"type": "absolute", "value": "0.05"}},
            "mz_tolerance": {{"type": "percent", "value": "0.01"}},
            "sample_order": ["a", "b"],
            "export": {{"filename": {:?}, "filter": "only_with_ms2"}}
        }}"#,
        dir.path().join("{}.csv").to_str().unwrap()
    ))
    .unwrap();

    let samples = load_file(&input).unwrap();
    let samples = rusty_aligner::config::apply_sample_order(
        samples,
        params.sample_order.as_deref(),
    )
    .unwrap();
    let table = align("feed", &samples, params.tolerances().unwrap());
    assert_eq!(table.samples(), &[SampleId::from("a"), SampleId::from("b")]);
    assert_eq!(table.len(), 2);

    let task = ExportTask::new(table.into_shared(), params.export_settings().unwrap());
    assert_eq!(task.run(), TaskStatus::Finished);

    let text = std::fs::read_to_string(dir.path().join("feed.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "row ID,row m/z,row retention time,number of detected peaks,\
         a Peak height,a Peak area,b Peak height,b Peak area"
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",2,4000,500,9000,1000"));
}
