//! Core data types: raw work items, flattened rows and dependency edges.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use pyo3::prelude::*;
use std::fmt;

/// A raw predecessor or successor link as delivered by the data layer.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkRecord {
    /// Id of the task on the other end of the link.
    #[pyo3(get, set)]
    pub task_id: String,
    /// Relationship text in any common spelling ("FS", "FINISH_START", ...).
    #[pyo3(get, set)]
    pub relationship: String,
    #[pyo3(get, set)]
    pub lag_days: f64,
    /// The other task lives in a different project file.
    #[pyo3(get, set)]
    pub is_external: bool,
}

#[pymethods]
impl LinkRecord {
    #[new]
    #[pyo3(signature = (task_id, relationship="FS".to_string(), lag_days=0.0, is_external=false))]
    fn new(task_id: String, relationship: String, lag_days: f64, is_external: bool) -> Self {
        Self {
            task_id,
            relationship,
            lag_days,
            is_external,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "LinkRecord(task_id={:?}, relationship={:?}, lag_days={})",
            self.task_id, self.relationship, self.lag_days
        )
    }
}

/// One node of the work breakdown forest. Immutable for the engine.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkItem {
    #[pyo3(get, set)]
    pub id: String,
    /// Type tag from the data layer ("project", "unit", "phase", "task", ...).
    #[pyo3(get, set)]
    pub item_type: Option<String>,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub code: Option<String>,
    #[pyo3(get, set)]
    pub start_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub end_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub baseline_start: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub baseline_end: Option<NaiveDate>,
    /// Duration hint in days.
    #[pyo3(get, set)]
    pub duration_days: Option<f64>,
    #[pyo3(get, set)]
    pub percent_complete: f64,
    #[pyo3(get, set)]
    pub baseline_hours: f64,
    #[pyo3(get, set)]
    pub actual_hours: f64,
    #[pyo3(get, set)]
    pub projected_hours: f64,
    #[pyo3(get, set)]
    pub remaining_hours: Option<f64>,
    #[pyo3(get, set)]
    pub baseline_cost: f64,
    #[pyo3(get, set)]
    pub actual_cost: f64,
    #[pyo3(get, set)]
    pub remaining_cost: Option<f64>,
    /// Delimited predecessor text such as "101FS+2;102SS-1".
    #[pyo3(get, set)]
    pub predecessor_text: Option<String>,
    /// Structured predecessor links; take precedence over `predecessor_text`.
    #[pyo3(get, set)]
    pub predecessors: Vec<LinkRecord>,
    /// Structured successor links, each naming a task that depends on this one.
    #[pyo3(get, set)]
    pub successors: Vec<LinkRecord>,
    #[pyo3(get, set)]
    pub children: Vec<WorkItem>,
}

#[pymethods]
impl WorkItem {
    #[new]
    #[pyo3(signature = (
        id,
        name=String::new(),
        item_type=None,
        code=None,
        start_date=None,
        end_date=None,
        baseline_start=None,
        baseline_end=None,
        duration_days=None,
        percent_complete=0.0,
        predecessor_text=None,
        predecessors=None,
        successors=None,
        children=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: String,
        name: String,
        item_type: Option<String>,
        code: Option<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        baseline_start: Option<NaiveDate>,
        baseline_end: Option<NaiveDate>,
        duration_days: Option<f64>,
        percent_complete: f64,
        predecessor_text: Option<String>,
        predecessors: Option<Vec<LinkRecord>>,
        successors: Option<Vec<LinkRecord>>,
        children: Option<Vec<WorkItem>>,
    ) -> Self {
        Self {
            id,
            item_type,
            name,
            code,
            start_date,
            end_date,
            baseline_start,
            baseline_end,
            duration_days,
            percent_complete,
            predecessor_text,
            predecessors: predecessors.unwrap_or_default(),
            successors: successors.unwrap_or_default(),
            children: children.unwrap_or_default(),
            ..Self::default()
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "WorkItem(id={:?}, name={:?}, children={})",
            self.id,
            self.name,
            self.children.len()
        )
    }
}

/// Position of a row in the project hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HierarchyKind {
    Project,
    Unit,
    Phase,
    #[default]
    Task,
}

impl HierarchyKind {
    /// Classify by explicit type tag, falling back to the outline level.
    pub fn classify(item_type: Option<&str>, level: u32) -> Self {
        let tagged = item_type.and_then(|tag| match tag.trim().to_ascii_lowercase().as_str() {
            "project" => Some(Self::Project),
            "unit" => Some(Self::Unit),
            "phase" => Some(Self::Phase),
            "task" | "milestone" | "activity" => Some(Self::Task),
            _ => None,
        });
        tagged.unwrap_or(match level {
            0 | 1 => Self::Project,
            2 => Self::Unit,
            3 => Self::Phase,
            _ => Self::Task,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Unit => "unit",
            Self::Phase => "phase",
            Self::Task => "task",
        }
    }
}

/// A row of the flattened breakdown, rebuilt wholesale on every flatten.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatRow {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub parent_id: Option<String>,
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub code: Option<String>,
    pub kind: HierarchyKind,
    /// 1 for roots; indentation only.
    #[pyo3(get)]
    pub level: u32,
    #[pyo3(get)]
    pub has_children: bool,
    #[pyo3(get)]
    pub expanded: bool,
    #[pyo3(get)]
    pub start: Option<NaiveDate>,
    #[pyo3(get)]
    pub end: Option<NaiveDate>,
    /// Resolved duration in whole days, never below 1.
    #[pyo3(get)]
    pub duration_days: i64,
    #[pyo3(get)]
    pub percent_complete: f64,
    #[pyo3(get)]
    pub baseline_hours: f64,
    #[pyo3(get)]
    pub actual_hours: f64,
    #[pyo3(get)]
    pub projected_hours: f64,
    #[pyo3(get)]
    pub remaining_hours: Option<f64>,
    #[pyo3(get)]
    pub baseline_cost: f64,
    #[pyo3(get)]
    pub actual_cost: f64,
    #[pyo3(get)]
    pub remaining_cost: Option<f64>,
    /// Normalized predecessor ids in declaration order.
    #[pyo3(get)]
    pub predecessor_ids: Vec<String>,
    /// Signed total float in days; `None` until the CPM pass has run.
    #[pyo3(get)]
    pub total_float: Option<i64>,
    #[pyo3(get)]
    pub is_critical: bool,
}

impl FlatRow {
    /// Look up a numeric field by its dashboard metric name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "percentComplete" => Some(self.percent_complete),
            "baselineHours" => Some(self.baseline_hours),
            "actualHours" => Some(self.actual_hours),
            "projectedHours" => Some(self.projected_hours),
            "remainingHours" => self.remaining_hours,
            "baselineCost" => Some(self.baseline_cost),
            "actualCost" => Some(self.actual_cost),
            "remainingCost" => self.remaining_cost,
            "duration" => Some(self.duration_days as f64),
            "totalFloat" => self.total_float.map(|f| f as f64),
            _ => None,
        }
    }

    /// A leaf whose start and end fall on the same day.
    pub fn is_milestone(&self) -> bool {
        !self.has_children && self.start.is_some() && self.start == self.end
    }
}

#[pymethods]
impl FlatRow {
    #[getter]
    fn hierarchy(&self) -> &'static str {
        self.kind.as_str()
    }

    fn __repr__(&self) -> String {
        format!(
            "FlatRow(id={:?}, level={}, start={:?}, end={:?}, float={:?})",
            self.id, self.level, self.start, self.end, self.total_float
        )
    }
}

/// Dependency relationship between a predecessor and its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Relationship {
    /// Finish-to-Start.
    #[default]
    FS,
    /// Start-to-Start.
    SS,
    /// Finish-to-Finish.
    FF,
    /// Start-to-Finish.
    SF,
}

impl Relationship {
    /// Parse an exact two-letter code, case-insensitive.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "FS" => Some(Self::FS),
            "SS" => Some(Self::SS),
            "FF" => Some(Self::FF),
            "SF" => Some(Self::SF),
            _ => None,
        }
    }

    /// Normalize any common spelling; unknown text falls back to FS.
    pub fn normalize(text: &str) -> Self {
        let upper = text.trim().to_ascii_uppercase();
        let compact: String = upper
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        if let Some(rel) = Self::from_code(&compact) {
            return rel;
        }
        match compact.as_str() {
            "FINISHSTART" | "FINISHTOSTART" => Self::FS,
            "STARTSTART" | "STARTTOSTART" => Self::SS,
            "FINISHFINISH" | "FINISHTOFINISH" => Self::FF,
            "STARTFINISH" | "STARTTOFINISH" => Self::SF,
            _ => Self::FS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FS => "FS",
            Self::SS => "SS",
            Self::FF => "FF",
            Self::SF => "SF",
        }
    }

    /// Whether the constraint is anchored at the predecessor's start.
    pub fn from_predecessor_start(&self) -> bool {
        matches!(self, Self::SS | Self::SF)
    }

    /// Whether the constraint lands on the target's finish.
    pub fn to_target_finish(&self) -> bool {
        matches!(self, Self::FF | Self::SF)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized link: `predecessor_id` constrains `target_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub target_id: String,
    pub predecessor_id: String,
    pub relationship: Relationship,
    /// Whole days; negative values are leads.
    pub lag_days: i64,
    /// The predecessor id matched a loaded row.
    pub resolved: bool,
    pub external: bool,
}

/// Largest day offset the engine represents. Lags and durations beyond it
/// are clamped so schedule arithmetic stays far from `i64` overflow and
/// inside chrono's date range.
pub const MAX_SPAN_DAYS: i64 = 1_000_000;

/// Round a day count and clamp it to `±MAX_SPAN_DAYS`. NaN is 0.
pub fn clamp_days(days: f64) -> i64 {
    if days.is_nan() {
        return 0;
    }
    let limit = MAX_SPAN_DAYS as f64;
    days.round().clamp(-limit, limit) as i64
}

/// Parse a date leniently; malformed input is treated as absent.
///
/// Accepts `YYYY-MM-DD`, local date-times (`YYYY-MM-DDTHH:MM[:SS[.f]]`, also
/// with a space separator) and RFC 3339 timestamps.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}
