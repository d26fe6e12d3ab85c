use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::data::model::SharedTable;

use super::{export_table, ExportOutcome, ExportSettings, SpectraMerger};

// ---------------------------------------------------------------------------
// Status reported to the job host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Error | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation flag, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Rows written out of rows accepted by the filter.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl Progress {
    pub(crate) fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    pub(crate) fn advance(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.done() as f64 / total as f64
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    error_message: Option<String>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<TaskState>,
    cancel: CancelToken,
    progress: Progress,
}

impl Shared {
    fn set(&self, status: TaskStatus, error_message: Option<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.status = status;
        state.error_message = error_message;
    }
}

/// Cloneable view of a task for the host: poll status, request cancellation.
#[derive(Debug, Clone)]
pub struct TaskHandle(Arc<Shared>);

impl TaskHandle {
    pub fn status(&self) -> TaskStatus {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn error_message(&self) -> Option<String> {
        self.0
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error_message
            .clone()
    }

    pub fn cancel(&self) {
        self.0.cancel.cancel();
    }

    pub fn finished_fraction(&self) -> f64 {
        self.0.progress.fraction()
    }
}

// ---------------------------------------------------------------------------
// ExportTask – one export as a unit of work
// ---------------------------------------------------------------------------

/// Export of one frozen table snapshot.
///
/// `run` is synchronous; whichever thread the host picks executes it. The
/// table is only read, so several tasks over the same snapshot may run at once.
pub struct ExportTask {
    table: SharedTable,
    settings: ExportSettings,
    merger: Option<Arc<dyn SpectraMerger>>,
    shared: Arc<Shared>,
}

impl ExportTask {
    pub fn new(table: SharedTable, settings: ExportSettings) -> Self {
        ExportTask {
            table,
            settings,
            merger: None,
            shared: Arc::new(Shared {
                state: Mutex::new(TaskState {
                    status: TaskStatus::Waiting,
                    error_message: None,
                }),
                cancel: CancelToken::default(),
                progress: Progress::default(),
            }),
        }
    }

    /// Merge MS/MS spectra per exported row instead of taking the best one.
    pub fn with_merger(mut self, merger: Arc<dyn SpectraMerger>) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle(Arc::clone(&self.shared))
    }

    pub fn description(&self) -> String {
        format!(
            "Exporting feature list {} to {}",
            self.table.name(),
            self.settings.template.resolve(self.table.name()).display()
        )
    }

    pub fn run(self) -> TaskStatus {
        let shared = &self.shared;
        if shared.cancel.is_cancelled() {
            shared.set(TaskStatus::Cancelled, None);
            return TaskStatus::Cancelled;
        }
        shared.set(TaskStatus::Running, None);
        info!("{}", self.description());

        let outcome = export_table(
            &self.table,
            &self.settings,
            self.merger.as_deref(),
            &shared.cancel,
            &shared.progress,
        );

        match outcome {
            Ok(ExportOutcome::Completed { rows, files }) => {
                info!("exported {rows} rows to {} file(s)", files.len());
                shared.set(TaskStatus::Finished, None);
                TaskStatus::Finished
            }
            Ok(ExportOutcome::Cancelled { rows }) => {
                warn!("export of {} cancelled after {rows} rows", self.table.name());
                shared.set(TaskStatus::Cancelled, None);
                TaskStatus::Cancelled
            }
            Err(e) => {
                error!("export of {} failed: {e}", self.table.name());
                shared.set(TaskStatus::Error, Some(e.to_string()));
                TaskStatus::Error
            }
        }
    }
}

/// Run `task` on its own thread and poll it every `tick` until the thread ends,
/// passing the finished fraction to `on_tick`.
///
/// Returns `None` if the worker panicked; the handle then still reports the
/// status it had when the panic happened.
pub fn run_in_background(
    task: ExportTask,
    tick: Duration,
    mut on_tick: impl FnMut(f64),
) -> Option<TaskStatus> {
    let handle = task.handle();
    let worker = thread::spawn(move || task.run());
    while !worker.is_finished() {
        thread::sleep(tick);
        on_tick(handle.finished_fraction());
    }
    worker.join().ok()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::data::filter::RowFilter;
    use crate::data::model::{FeatureRow, FeatureTable, FragmentSpectrum, Measurement, Peak, RowId, SampleId};
    use crate::export::template::NameTemplate;
    use crate::export::ExportFormat;

    fn table() -> SharedTable {
        let mut t = FeatureTable::new("Demo", vec!["s1".into()]);
        for (id, rt) in [(1, 1.0), (2, 2.0), (3, 3.0)] {
            t.push_row(FeatureRow::new(
                RowId(id),
                "s1".into(),
                Peak::new(Measurement {
                    retention_time: rt,
                    mz: 100.0 * rt,
                    intensity: 10.0,
                    area: 100.0,
                }),
            ));
        }
        t.into_shared()
    }

    fn settings(dir: &Path, pattern: &str, format: ExportFormat) -> ExportSettings {
        ExportSettings {
            template: NameTemplate::parse(dir.join(pattern).to_str().unwrap()).unwrap(),
            format,
            filter: RowFilter::All,
        }
    }

    /// Hands out a spectrum for every row and cancels the task on the first one.
    struct CancellingMerger {
        handle: TaskHandle,
    }

    impl SpectraMerger for CancellingMerger {
        fn merge(&self, row: &FeatureRow, _samples: &[SampleId]) -> Option<FragmentSpectrum> {
            self.handle.cancel();
            Some(FragmentSpectrum {
                precursor_mz: row.average_mz(),
                mz: vec![50.0],
                intensity: vec![1.0],
            })
        }
    }

    struct PanickingMerger;

    impl SpectraMerger for PanickingMerger {
        fn merge(&self, _row: &FeatureRow, _samples: &[SampleId]) -> Option<FragmentSpectrum> {
            panic!("merge failed");
        }
    }

    #[test]
    fn test_background_run_finishes() {
        let dir = tempdir().unwrap();
        let task = ExportTask::new(table(), settings(dir.path(), "{}.csv", ExportFormat::Csv));
        let handle = task.handle();
        let status = run_in_background(task, Duration::from_millis(1), |_| {});
        assert_eq!(status, Some(TaskStatus::Finished));
        assert_eq!(handle.status(), TaskStatus::Finished);
    }

    #[test]
    fn test_background_run_returns_when_worker_panics() {
        let dir = tempdir().unwrap();
        let task = ExportTask::new(table(), settings(dir.path(), "{}.mgf", ExportFormat::Gnps))
            .with_merger(Arc::new(PanickingMerger));
        let handle = task.handle();
        let status = run_in_background(task, Duration::from_millis(1), |_| {});
        assert_eq!(status, None);
        assert_eq!(handle.status(), TaskStatus::Running);
    }

    #[test]
    fn test_failed_export_reports_error_message() {
        let dir = tempdir().unwrap();
        let task = ExportTask::new(table(), settings(dir.path(), "missing/{}.csv", ExportFormat::Csv));
        let handle = task.handle();

        assert_eq!(task.run(), TaskStatus::Error);
        assert_eq!(handle.status(), TaskStatus::Error);
        let message = handle.error_message().unwrap();
        assert!(message.contains("Demo.csv"), "{message}");
        assert!(!message.contains("at row"));
    }

    #[test]
    fn test_cancel_before_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let task = ExportTask::new(table(), settings(dir.path(), "{}.csv", ExportFormat::Csv));
        let handle = task.handle();
        handle.cancel();

        assert_eq!(task.run(), TaskStatus::Cancelled);
        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert_eq!(handle.error_message(), None);
        assert!(!dir.path().join("Demo.csv").exists());
    }

    #[test]
    fn test_cancel_between_rows_keeps_written_rows() {
        let dir = tempdir().unwrap();
        let task = ExportTask::new(table(), settings(dir.path(), "{}.mgf", ExportFormat::Gnps));
        let merger = CancellingMerger {
            handle: task.handle(),
        };
        let task = task.with_merger(Arc::new(merger));
        let handle = task.handle();

        assert_eq!(task.run(), TaskStatus::Cancelled);
        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert!((handle.finished_fraction() - 1.0 / 3.0).abs() < 1e-12);

        let mgf = std::fs::read_to_string(dir.path().join("Demo.mgf")).unwrap();
        assert_eq!(mgf.matches("BEGIN IONS").count(), 1);
        assert!(mgf.contains("FEATURE_ID=1\n"));
        let quant = std::fs::read_to_string(dir.path().join("Demo_quant.csv")).unwrap();
        let ids: Vec<&str> = quant.lines().skip(1).map(|l| &l[..1]).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_progress_fraction() {
        let p = Progress::default();
        assert_eq!(p.fraction(), 0.0);
        p.start(4);
        p.advance();
        assert_eq!(p.fraction(), 0.25);
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::default();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_done_states() {
        assert!(!TaskStatus::Waiting.is_done());
        assert!(!TaskStatus::Running.is_done());
        assert!(TaskStatus::Cancelled.is_done());
        assert_eq!(TaskStatus::Error.to_string(), "error");
    }
}
