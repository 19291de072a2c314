//! One recompute generation: every derived structure the render surfaces
//! consume, built together so grid and timeline always agree.

use std::collections::HashSet;
use std::hash::BuildHasher;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::config::{ConfigError, EngineConfig};
use crate::cpm::{calculate, CpmOptions, CpmResult, NodeTiming, ScheduleNode};
use crate::dependency::{resolve_links, DependencyCoverage, ResolutionReport, ResolvedLinks};
use crate::models::{FlatRow, WorkItem};
use crate::timeline::{Tick, TimeScale, TimelineMapper, VisibleRange, Zoom};
use crate::viewport::{RowWindow, Viewport};
use crate::wbs::{expand_all, flatten};
use crate::{log_detail, log_summary};

/// Caller-owned view parameters for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub scroll_offset: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub granularity: TimeScale,
    pub zoom: Zoom,
    /// Anchor for the today line and for forests without any dates.
    pub today: NaiveDate,
}

impl ViewState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            scroll_offset: 0.0,
            viewport_width: 1280.0,
            viewport_height: 720.0,
            granularity: TimeScale::default(),
            zoom: Zoom::default(),
            today,
        }
    }
}

/// Lookup into a stored snapshot of task metrics.
pub trait SnapshotSource {
    fn snapshot_value(&self, metric: &str, task_id: &str) -> Option<f64>;
}

impl<F> SnapshotSource for F
where
    F: Fn(&str, &str) -> Option<f64>,
{
    fn snapshot_value(&self, metric: &str, task_id: &str) -> Option<f64> {
        self(metric, task_id)
    }
}

/// Result of scheduling a whole forest, independent of any view.
#[derive(Clone, Debug, Default)]
pub struct ForestSchedule {
    /// Every node, fully expanded, in pre-order.
    pub rows: Vec<FlatRow>,
    pub links: ResolvedLinks,
    pub result: CpmResult,
    /// Calendar day that CPM offset 0 maps to.
    pub origin: NaiveDate,
}

/// Resolve links and run CPM over the fully expanded forest.
pub fn schedule_forest(forest: &[WorkItem], config: &EngineConfig, today: NaiveDate) -> ForestSchedule {
    let links = resolve_links(forest);
    for issue in &links.report.issues {
        log_detail!(config.verbosity, "{}", issue);
    }

    let rows = flatten(forest, &expand_all(forest));
    let nodes = ScheduleNode::from_rows(&rows, &links, config.leaves_only);
    let origin = rows
        .iter()
        .filter(|row| !config.leaves_only || !row.has_children)
        .filter_map(|row| row.start)
        .min()
        .unwrap_or(today);

    let options = CpmOptions {
        target_finish: None,
        verbosity: config.verbosity,
    };
    let result = calculate(&nodes, &options);

    ForestSchedule {
        rows,
        links,
        result,
        origin,
    }
}

/// Float per row id: scheduled rows use their own timing, unscheduled
/// summaries take the minimum over their scheduled descendants.
fn rolled_up_float(all_rows: &[FlatRow], result: &CpmResult) -> FxHashMap<String, i64> {
    let mut floats: FxHashMap<String, i64> =
        FxHashMap::with_capacity_and_hasher(all_rows.len(), Default::default());
    // Reverse pre-order visits children before their parent.
    for row in all_rows.iter().rev() {
        let own = result
            .get(&row.id)
            .map(|t| t.total_float)
            .or_else(|| floats.get(&row.id).copied());
        let Some(float) = own else {
            continue;
        };
        floats.insert(row.id.clone(), float);
        if let Some(parent) = &row.parent_id {
            floats
                .entry(parent.clone())
                .and_modify(|f| *f = (*f).min(float))
                .or_insert(float);
        }
    }
    floats
}

/// Everything one render pass needs, from a single generation.
#[derive(Clone, Debug)]
pub struct ScheduleFrame {
    pub generation: u64,
    /// Visible rows in display order, float and criticality applied.
    pub rows: Vec<FlatRow>,
    /// Node count of the fully expanded forest.
    pub all_rows_count: usize,
    pub schedule: CpmResult,
    pub origin: NaiveDate,
    pub links: ResolvedLinks,
    pub mapper: TimelineMapper,
    pub granularity: TimeScale,
    pub ticks: Vec<Tick>,
    pub viewport: Viewport,
    pub today: NaiveDate,
    pub arrow_jog: f64,
    row_index: FxHashMap<String, usize>,
}

impl ScheduleFrame {
    pub fn report(&self) -> &ResolutionReport {
        &self.links.report
    }

    pub fn coverage(&self) -> &DependencyCoverage {
        &self.links.coverage
    }

    /// Display index of a visible row.
    pub fn row_index(&self, id: &str) -> Option<usize> {
        self.row_index.get(id).copied()
    }

    pub fn row(&self, id: &str) -> Option<&FlatRow> {
        self.row_index(id).map(|idx| &self.rows[idx])
    }

    pub fn timing(&self, id: &str) -> Option<&NodeTiming> {
        self.schedule.get(id)
    }

    /// Rows inside the viewport window, with their display indices.
    pub fn windowed_rows(&self) -> impl Iterator<Item = (usize, &FlatRow)> {
        let range = self.viewport.window.map(|w| w.indices());
        range
            .into_iter()
            .flatten()
            .filter_map(|idx| self.rows.get(idx).map(|row| (idx, row)))
    }

    /// Start and end to draw for a row: its own dates, else its CPM early
    /// dates projected from the origin.
    pub fn bar_dates(&self, row: &FlatRow) -> Option<(NaiveDate, NaiveDate)> {
        match (row.start, row.end) {
            (Some(start), Some(end)) => Some((start, end)),
            (Some(start), None) => Some((start, start)),
            _ => self.timing(&row.id)?.early_dates(self.origin),
        }
    }

    /// Current value minus the snapshot value, when both exist.
    pub fn snapshot_delta<S>(&self, source: &S, metric: &str, task_id: &str) -> Option<f64>
    where
        S: SnapshotSource + ?Sized,
    {
        let current = self.row(task_id)?.metric(metric)?;
        let snapshot = source.snapshot_value(metric, task_id)?;
        Some(current - snapshot)
    }
}

/// Owns the configuration and stamps each frame with a new generation.
#[derive(Clone, Debug, Default)]
pub struct FrameBuilder {
    config: EngineConfig,
    generation: u64,
    last_window: Option<RowWindow>,
}

impl FrameBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            generation: 0,
            last_window: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Generation of the last frame built, 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Row window of the last frame built.
    pub fn last_window(&self) -> Option<RowWindow> {
        self.last_window
    }

    /// Recompute every derived structure for `forest` under `expansion`.
    ///
    /// Only an invalid configuration fails; data problems degrade locally
    /// and show up in the frame's report.
    pub fn build<S: BuildHasher>(
        &mut self,
        forest: &[WorkItem],
        expansion: &HashSet<String, S>,
        view: &ViewState,
    ) -> Result<ScheduleFrame, ConfigError> {
        self.config.validate()?;
        let config = &self.config;

        let scheduled = schedule_forest(forest, config, view.today);
        let floats = rolled_up_float(&scheduled.rows, &scheduled.result);

        let mut rows = flatten(forest, expansion);
        let mut row_index = FxHashMap::with_capacity_and_hasher(rows.len(), Default::default());
        for (idx, row) in rows.iter_mut().enumerate() {
            row.total_float = floats.get(&row.id).copied();
            row.is_critical = row.total_float.is_some_and(|f| f <= 0);
            row_index.entry(row.id.clone()).or_insert(idx);
        }

        let range = VisibleRange::from_rows(&scheduled.rows, config, view.today);
        let mapper = TimelineMapper::for_view(range, view.zoom, view.viewport_width, config);
        let ticks = mapper.ticks(view.granularity);
        let viewport = Viewport::compute(
            rows.len(),
            view.scroll_offset,
            view.viewport_height,
            config,
        );

        if viewport.window != self.last_window {
            log_detail!(
                config.verbosity,
                "viewport window {:?} -> {:?}",
                self.last_window.map(|w| (w.start, w.end)),
                viewport.window.map(|w| (w.start, w.end))
            );
            self.last_window = viewport.window;
        }

        self.generation += 1;
        log_summary!(
            config.verbosity,
            "frame {}: {} of {} rows visible, window {:?}, {:.2} px/day",
            self.generation,
            rows.len(),
            scheduled.rows.len(),
            viewport.window.map(|w| (w.start, w.end)),
            mapper.pixels_per_day
        );

        Ok(ScheduleFrame {
            generation: self.generation,
            rows,
            all_rows_count: scheduled.rows.len(),
            schedule: scheduled.result,
            origin: scheduled.origin,
            links: scheduled.links,
            mapper,
            granularity: view.granularity,
            ticks,
            viewport,
            today: view.today,
            arrow_jog: config.arrow_jog,
            row_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinkRecord, MAX_SPAN_DAYS};
    use crate::wbs::collapse_to_level;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_item(id: &str, start: Option<NaiveDate>, duration: f64, preds: &str) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            name: id.to_uppercase(),
            start_date: start,
            duration_days: Some(duration),
            predecessor_text: (!preds.is_empty()).then(|| preds.to_string()),
            ..WorkItem::default()
        }
    }

    fn make_forest() -> Vec<WorkItem> {
        let mut phase = make_item("ph", None, 1.0, "");
        phase.children = vec![
            make_item("a", Some(date(2025, 1, 6)), 5.0, ""),
            make_item("b", Some(date(2025, 1, 11)), 3.0, "a"),
            make_item("d", Some(date(2025, 1, 6)), 1.0, ""),
        ];
        let mut c = make_item("c", Some(date(2025, 1, 14)), 2.0, "");
        c.predecessors = vec![LinkRecord {
            task_id: "b".to_string(),
            relationship: "FINISH_START".to_string(),
            lag_days: 0.0,
            is_external: false,
        }];
        let mut project = make_item("p", None, 1.0, "");
        project.children = vec![phase, c];
        vec![project]
    }

    fn view() -> ViewState {
        ViewState::new(date(2025, 1, 1))
    }

    #[test]
    fn test_build_applies_schedule_to_rows() {
        let forest = make_forest();
        let mut builder = FrameBuilder::default();
        let frame = builder.build(&forest, &expand_all(&forest), &view()).unwrap();

        assert_eq!(frame.generation, 1);
        assert_eq!(frame.all_rows_count, 6);
        assert_eq!(frame.rows.len(), 6);
        assert_eq!(frame.origin, date(2025, 1, 6));
        assert_eq!(frame.schedule.project_finish, 10);

        let d = frame.row("d").unwrap();
        assert_eq!(d.total_float, Some(9));
        assert!(!d.is_critical);
        assert!(frame.row("b").unwrap().is_critical);

        // summaries take the minimum float of their descendants
        assert_eq!(frame.row("ph").unwrap().total_float, Some(0));
        assert!(frame.row("p").unwrap().is_critical);
        assert!(frame.report().is_clean());
    }

    #[test]
    fn test_collapsed_rows_still_scheduled() {
        let forest = make_forest();
        let mut builder = FrameBuilder::default();
        let collapsed = collapse_to_level(&forest, 1);
        let frame = builder.build(&forest, &collapsed, &view()).unwrap();

        assert_eq!(frame.rows.len(), 1);
        assert_eq!(frame.all_rows_count, 6);
        assert_eq!(frame.schedule.total_count(), 4);
        assert_eq!(frame.rows[0].total_float, Some(0));
        assert!(frame.row("a").is_none());
        assert!(frame.timing("a").is_some());
    }

    #[test]
    fn test_generation_increments() {
        let forest = make_forest();
        let expansion: HashSet<String> = HashSet::new();
        let mut builder = FrameBuilder::new(EngineConfig::default());
        assert_eq!(builder.generation(), 0);
        let first = builder.build(&forest, &expansion, &view()).unwrap();
        let second = builder.build(&forest, &expansion, &view()).unwrap();
        assert_eq!(first.generation + 1, second.generation);
        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            row_height: 0.0,
            ..EngineConfig::default()
        };
        let mut builder = FrameBuilder::new(config);
        let err = builder
            .build(&make_forest(), &HashSet::<String>::new(), &view())
            .unwrap_err();
        assert_eq!(err, ConfigError::RowHeight(0.0));
        assert_eq!(builder.generation(), 0);
    }

    #[test]
    fn test_tracks_window_changes() {
        let forest = make_forest();
        let expansion = expand_all(&forest);
        let mut builder = FrameBuilder::new(EngineConfig {
            overscan: 0,
            verbosity: 2,
            ..EngineConfig::default()
        });
        assert_eq!(builder.last_window(), None);

        let mut state = view();
        state.viewport_height = 64.0;
        let frame = builder.build(&forest, &expansion, &state).unwrap();
        assert_eq!(builder.last_window(), frame.viewport.window);
        assert_eq!(builder.last_window(), Some(RowWindow { start: 0, end: 2 }));

        state.scroll_offset = 96.0;
        builder.build(&forest, &expansion, &state).unwrap();
        assert_eq!(builder.last_window(), Some(RowWindow { start: 3, end: 5 }));

        builder.build(&[], &expansion, &state).unwrap();
        assert_eq!(builder.last_window(), None);
    }

    #[test]
    fn test_extreme_lag_schedules() {
        let a = make_item("a", Some(date(2025, 1, 6)), 5.0, "");
        let mut b = make_item("b", None, 1.0, "");
        b.predecessors = vec![LinkRecord {
            task_id: "a".to_string(),
            relationship: "FS".to_string(),
            lag_days: 1e30,
            is_external: false,
        }];
        let forest = vec![a, b];

        let scheduled = schedule_forest(&forest, &EngineConfig::default(), date(2025, 1, 1));
        let b = scheduled.result.get("b").unwrap();
        assert_eq!(b.early_start, 5 + MAX_SPAN_DAYS);
        assert_eq!(b.governing_predecessor.as_deref(), Some("a"));

        let mut builder = FrameBuilder::default();
        let frame = builder.build(&forest, &expand_all(&forest), &view()).unwrap();
        let (start, _) = frame.bar_dates(frame.row("b").unwrap()).unwrap();
        assert_eq!((start - date(2025, 1, 6)).num_days(), 5 + MAX_SPAN_DAYS);
    }

    #[test]
    fn test_empty_forest() {
        let mut builder = FrameBuilder::default();
        let frame = builder.build(&[], &HashSet::<String>::new(), &view()).unwrap();
        assert!(frame.rows.is_empty());
        assert!(frame.schedule.is_empty());
        assert_eq!(frame.viewport.window, None);
        assert_eq!(frame.origin, date(2025, 1, 1));
        assert_eq!(frame.mapper.range.start, date(2024, 12, 18));
        assert_eq!(frame.coverage().coverage_percent, 0.0);
    }

    #[test]
    fn test_snapshot_delta() {
        let mut forest = make_forest();
        forest[0].children[1].actual_hours = 12.0;
        let mut builder = FrameBuilder::default();
        let frame = builder.build(&forest, &expand_all(&forest), &view()).unwrap();

        let mut stored: HashMap<(String, String), f64> = HashMap::new();
        stored.insert(("actualHours".to_string(), "c".to_string()), 9.5);
        stored.insert(("totalFloat".to_string(), "d".to_string()), 4.0);
        let source = |metric: &str, task: &str| {
            stored
                .get(&(metric.to_string(), task.to_string()))
                .copied()
        };

        assert_eq!(frame.snapshot_delta(&source, "actualHours", "c"), Some(2.5));
        assert_eq!(frame.snapshot_delta(&source, "totalFloat", "d"), Some(5.0));
        assert_eq!(frame.snapshot_delta(&source, "actualHours", "a"), None);
        assert_eq!(frame.snapshot_delta(&source, "unknownMetric", "c"), None);
    }

    #[test]
    fn test_windowed_rows_and_bar_dates() {
        let forest = make_forest();
        let mut builder = FrameBuilder::default();
        let mut state = view();
        state.viewport_height = 64.0;
        builder.set_config(EngineConfig {
            overscan: 0,
            ..EngineConfig::default()
        });
        let frame = builder.build(&forest, &expand_all(&forest), &state).unwrap();

        let ids: Vec<&str> = frame.windowed_rows().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "ph", "a"]);

        let a = frame.row("a").unwrap();
        assert_eq!(frame.bar_dates(a), Some((date(2025, 1, 6), date(2025, 1, 11))));
    }

    #[test]
    fn test_schedule_forest_all_rows() {
        let forest = make_forest();
        let config = EngineConfig {
            leaves_only: false,
            ..EngineConfig::default()
        };
        let scheduled = schedule_forest(&forest, &config, date(2025, 1, 1));
        assert_eq!(scheduled.result.total_count(), 6);
        assert_eq!(scheduled.origin, date(2025, 1, 6));
    }
}
