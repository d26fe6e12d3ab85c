use std::sync::Arc;

use crate::data::filter::{filtered_indices, RowFilter};
use crate::data::model::{FeatureRow, SampleId, SharedTable};
use crate::data::stats::{LogRatioDataset, Metric};
use crate::export::task::ExportTask;
use crate::export::ExportSettings;

// ---------------------------------------------------------------------------
// Analysis session state
// ---------------------------------------------------------------------------

/// Everything a viewer shows about one aligned table, independent of rendering.
///
/// The table is a frozen snapshot; views and exports share it by reference
/// count and never observe a partially built table.
#[derive(Default)]
pub struct AnalysisState {
    /// Aligned table (None until alignment has run).
    pub table: Option<SharedTable>,

    /// Active row filter, shared with export.
    pub filter: RowFilter,

    /// Indices of rows passing the current filter (cached).
    pub visible_indices: Vec<usize>,

    /// Measurement field used by comparative statistics.
    pub metric: Metric,

    /// Samples in each comparison group.
    pub group_one: Vec<SampleId>,
    pub group_two: Vec<SampleId>,

    /// Log-ratio view over the two groups (cached).
    pub log_ratio: Option<LogRatioDataset>,

    /// Status / error message for the user.
    pub status_message: Option<String>,
}

impl AnalysisState {
    /// Ingest a newly aligned table and reset derived views.
    pub fn set_table(&mut self, table: SharedTable) {
        self.visible_indices = filtered_indices(&table, self.filter);
        self.group_one.retain(|s| table.samples().contains(s));
        self.group_two.retain(|s| table.samples().contains(s));
        self.table = Some(table);
        self.rebuild_log_ratio();
        self.status_message = None;
    }

    /// Recompute `visible_indices` after a filter change.
    pub fn set_filter(&mut self, filter: RowFilter) {
        self.filter = filter;
        if let Some(table) = &self.table {
            self.visible_indices = filtered_indices(table, filter);
        }
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.metric = metric;
        self.rebuild_log_ratio();
    }

    pub fn set_groups(&mut self, group_one: Vec<SampleId>, group_two: Vec<SampleId>) {
        self.group_one = group_one;
        self.group_two = group_two;
        self.rebuild_log_ratio();
    }

    /// Rebuild the log-ratio view; needs a table and two non-empty groups.
    pub fn rebuild_log_ratio(&mut self) {
        self.log_ratio = match &self.table {
            Some(table) if !self.group_one.is_empty() && !self.group_two.is_empty() => Some(
                LogRatioDataset::build(table, &self.group_one, &self.group_two, self.metric),
            ),
            _ => None,
        };
    }

    /// Rows passing the current filter, in table order.
    pub fn visible_rows(&self) -> Vec<&FeatureRow> {
        match &self.table {
            Some(table) => self
                .visible_indices
                .iter()
                .map(|&i| &table.rows()[i])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Export task over the current snapshot, using the preview's filter.
    pub fn export_task(&self, mut settings: ExportSettings) -> Option<ExportTask> {
        let table = self.table.as_ref()?;
        settings.filter = self.filter;
        Some(ExportTask::new(Arc::clone(table), settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matching::{align, MatchTolerances, SampleFeatures};
    use crate::data::model::{FragmentSpectrum, Measurement, Peak};
    use crate::data::tolerance::Tolerance;
    use crate::export::template::NameTemplate;
    use crate::export::ExportFormat;

    fn peak(rt: f64, area: f64) -> Peak {
        Peak::new(Measurement {
            retention_time: rt,
            mz: 200.0,
            intensity: area,
            area,
        })
    }

    fn shared() -> SharedTable {
        let samples = vec![
            SampleFeatures::new(
                "a",
                vec![
                    peak(1.0, 400.0),
                    peak(2.0, 10.0).with_fragmentation(FragmentSpectrum {
                        precursor_mz: 200.0,
                        mz: vec![1.0],
                        intensity: vec![1.0],
                    }),
                ],
            ),
            SampleFeatures::new("b", vec![peak(1.0, 100.0)]),
        ];
        let tol = MatchTolerances {
            rt: Tolerance::absolute(0.1).unwrap(),
            mz: Tolerance::absolute(0.1).unwrap(),
        };
        align("session", &samples, tol).into_shared()
    }

    #[test]
    fn test_preview_follows_filter() {
        let mut state = AnalysisState::default();
        state.set_table(shared());
        assert_eq!(state.visible_indices, vec![0, 1]);

        state.set_filter(RowFilter::OnlyWithMs2);
        assert_eq!(state.visible_indices, vec![1]);
        assert!(state.visible_rows().iter().all(|r| r.has_fragmentation()));
    }

    #[test]
    fn test_log_ratio_view_needs_both_groups() {
        let mut state = AnalysisState::default();
        state.set_table(shared());
        assert!(state.log_ratio.is_none());

        state.set_groups(vec!["a".into()], vec!["b".into()]);
        let view = state.log_ratio.as_ref().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.points()[0].log_ratio, 2.0);

        state.set_metric(Metric::Height);
        assert!(state.log_ratio.as_ref().unwrap().title().contains("heights"));
    }

    #[test]
    fn test_export_task_uses_preview_filter_and_snapshot() {
        let mut state = AnalysisState::default();
        assert!(state
            .export_task(ExportSettings {
                template: NameTemplate::parse("x_{}.csv").unwrap(),
                format: ExportFormat::Csv,
                filter: RowFilter::All,
            })
            .is_none());

        let table = shared();
        state.set_table(Arc::clone(&table));
        state.set_filter(RowFilter::OnlyWithMs2);
        let task = state.export_task(ExportSettings {
            template: NameTemplate::parse("x_{}.csv").unwrap(),
            format: ExportFormat::Csv,
            filter: RowFilter::All,
        });
        assert!(task.is_some());
        assert_eq!(Arc::strong_count(&table), 3);
    }
}
