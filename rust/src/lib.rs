//! Hierarchical WBS scheduling engine.
//!
//! Flattens a work breakdown forest under an external expansion set,
//! resolves heterogeneous predecessor data into typed dependency edges, runs
//! the critical path method over them, and turns the result into a
//! virtualized, backend-independent list of draw instructions.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::prelude::*;
use std::collections::{HashMap, HashSet};

pub mod config;
pub mod cpm;
pub mod dependency;
pub mod frame;
pub mod interner;
pub mod logging;
pub mod models;
pub mod render;
pub mod timeline;
pub mod viewport;
pub mod wbs;

pub use config::{ConfigError, EngineConfig};
pub use cpm::{calculate, CpmOptions, CpmResult, CycleEdge, NodeTiming, ScheduleNode};
pub use dependency::{
    normalize_id, resolve_links, DependencyCoverage, LinkIssue, ParsedLink, ResolutionReport,
    ResolvedLinks,
};
pub use frame::{schedule_forest, FrameBuilder, ScheduleFrame, SnapshotSource, ViewState};
pub use models::{
    parse_date, DependencyEdge, FlatRow, HierarchyKind, LinkRecord, Relationship, WorkItem,
};
pub use render::{render, DrawInstruction};
pub use timeline::{Tick, TimeScale, TimelineMapper, VisibleRange, Zoom};
pub use viewport::{compute_window, RowWindow, Viewport};
pub use wbs::{collapse_to_level, count_nodes, expand_all, flatten, hierarchy_counts};

/// Flatten a forest into display rows.
///
/// # Arguments
/// * `items` - Root work items
/// * `expanded` - Ids of nodes whose children are shown
///
/// # Returns
/// * Rows in depth-first pre-order (dates rolled up, float not yet applied)
#[pyfunction]
fn flatten_items(items: Vec<WorkItem>, expanded: HashSet<String>) -> Vec<FlatRow> {
    flatten(&items, &expanded)
}

/// Expansion set that opens every node with children.
#[pyfunction]
fn expand_all_ids(items: Vec<WorkItem>) -> HashSet<String> {
    expand_all(&items).into_iter().collect()
}

/// Expansion set that shows at most `level` levels.
#[pyfunction]
fn collapse_to_level_ids(items: Vec<WorkItem>, level: u32) -> HashSet<String> {
    collapse_to_level(&items, level).into_iter().collect()
}

/// Parse a delimited predecessor field.
///
/// # Returns
/// * `(links, bad_tokens)` where each link is `(predecessor_id, relationship, lag_days)`
#[pyfunction]
fn parse_predecessor_text(text: &str) -> (Vec<(String, String, i64)>, Vec<String>) {
    let (links, bad) = dependency::parse_predecessor_text(text);
    let links = links
        .into_iter()
        .map(|link| {
            (
                link.predecessor_id,
                link.relationship.as_str().to_string(),
                link.lag_days,
            )
        })
        .collect();
    (links, bad)
}

/// Run the critical path method over a forest.
///
/// # Arguments
/// * `items` - Root work items
/// * `config` - Engine configuration (defaults when omitted)
/// * `today` - Origin used when no scheduled row carries a start date
///
/// # Returns
/// * `(timings, project_finish, critical_count, cycle_edges)` where timings
///   are keyed by normalized id and cycle edges are `(predecessor, target)`
///
/// # Raises
/// * ValueError if the configuration is invalid
#[pyfunction]
#[pyo3(signature = (items, config=None, today=None))]
#[allow(clippy::type_complexity)]
fn calculate_schedule(
    items: Vec<WorkItem>,
    config: Option<EngineConfig>,
    today: Option<NaiveDate>,
) -> PyResult<(HashMap<String, NodeTiming>, i64, usize, Vec<(String, String)>)> {
    let config = config.unwrap_or_default();
    config
        .validate()
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;

    let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
    let scheduled = schedule_forest(&items, &config, today);
    let result = scheduled.result;
    let cycle_edges = result
        .removed_edges
        .iter()
        .map(|edge| (edge.predecessor_id.clone(), edge.target_id.clone()))
        .collect();

    Ok((
        result.timings.into_iter().collect(),
        result.project_finish,
        result.critical_count,
        cycle_edges,
    ))
}

/// The wbs_schedule Python module.
#[pymodule]
fn wbs_schedule(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<LinkRecord>()?;
    m.add_class::<WorkItem>()?;
    m.add_class::<FlatRow>()?;
    m.add_class::<NodeTiming>()?;

    // Config types
    m.add_class::<EngineConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(flatten_items, m)?)?;
    m.add_function(wrap_pyfunction!(expand_all_ids, m)?)?;
    m.add_function(wrap_pyfunction!(collapse_to_level_ids, m)?)?;
    m.add_function(wrap_pyfunction!(parse_predecessor_text, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_schedule, m)?)?;

    Ok(())
}
