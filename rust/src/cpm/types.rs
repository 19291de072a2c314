//! Types for the critical path pass.

use chrono::{Duration, NaiveDate};
use pyo3::prelude::*;
use rustc_hash::FxHashMap;

use crate::dependency::ResolvedLinks;
use crate::models::{DependencyEdge, FlatRow, MAX_SPAN_DAYS};

/// CPM working state for one row. Lives for a single `calculate` call.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleNode {
    pub id: String,
    /// Whole days, clamped to `1..=MAX_SPAN_DAYS`.
    pub duration: i64,
    /// Incoming edges in declaration order.
    pub incoming: Vec<DependencyEdge>,
}

impl ScheduleNode {
    pub fn new(id: impl Into<String>, duration: i64, incoming: Vec<DependencyEdge>) -> Self {
        Self {
            id: id.into(),
            duration: duration.clamp(1, MAX_SPAN_DAYS),
            incoming,
        }
    }

    /// Build nodes from flattened rows and the resolved edge set.
    ///
    /// With `leaves_only`, summary rows are not scheduled; edges touching
    /// them are dropped by the graph builder like any other unknown id.
    pub fn from_rows(rows: &[FlatRow], links: &ResolvedLinks, leaves_only: bool) -> Vec<Self> {
        rows.iter()
            .filter(|row| !leaves_only || !row.has_children)
            .map(|row| Self::new(&row.id, row.duration_days, links.incoming(&row.id).to_vec()))
            .collect()
    }
}

/// Knobs for one `calculate` call.
#[derive(Clone, Debug, Default)]
pub struct CpmOptions {
    /// Imposed finish (days from origin) for nodes without successors.
    /// When earlier than the computed finish, float goes negative.
    pub target_finish: Option<i64>,
    pub verbosity: u8,
}

/// Computed timing for one node, in whole days from the project origin.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTiming {
    #[pyo3(get)]
    pub early_start: i64,
    #[pyo3(get)]
    pub early_finish: i64,
    #[pyo3(get)]
    pub late_start: i64,
    #[pyo3(get)]
    pub late_finish: i64,
    /// Signed; negative means the chain already overruns its finish bound.
    #[pyo3(get)]
    pub total_float: i64,
    #[pyo3(get)]
    pub is_critical: bool,
    /// The incoming edge that set early start (first in input order on ties).
    #[pyo3(get)]
    pub governing_predecessor: Option<String>,
}

impl NodeTiming {
    /// Early start/finish projected onto the calendar. `None` when either
    /// end falls outside the representable date range.
    pub fn early_dates(&self, origin: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let shift = |days: i64| {
            Duration::try_days(days).and_then(|delta| origin.checked_add_signed(delta))
        };
        Some((shift(self.early_start)?, shift(self.early_finish)?))
    }
}

#[pymethods]
impl NodeTiming {
    fn __repr__(&self) -> String {
        format!(
            "NodeTiming(es={}, ef={}, ls={}, lf={}, float={}, critical={})",
            self.early_start,
            self.early_finish,
            self.late_start,
            self.late_finish,
            self.total_float,
            self.is_critical
        )
    }
}

/// An edge removed to break a dependency cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleEdge {
    pub predecessor_id: String,
    pub target_id: String,
    /// Node ids around the cycle, starting and ending at `target_id`.
    pub cycle: Vec<String>,
}

/// Output of one CPM calculation.
#[derive(Clone, Debug, Default)]
pub struct CpmResult {
    pub timings: FxHashMap<String, NodeTiming>,
    /// Scheduled node ids in input order.
    pub order: Vec<String>,
    pub project_finish: i64,
    pub critical_count: usize,
    /// Edges excluded because they closed a cycle.
    pub removed_edges: Vec<CycleEdge>,
    /// Edges ignored because an end was unknown, unresolved or repeated.
    pub dropped_edges: usize,
    /// Critical nodes from a start node to the finish, via governing edges.
    pub critical_chain: Vec<String>,
}

impl CpmResult {
    pub fn get(&self, id: &str) -> Option<&NodeTiming> {
        self.timings.get(id)
    }

    pub fn total_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_cycles(&self) -> bool {
        !self.removed_edges.is_empty()
    }
}
