//! Critical path calculation using forward and backward passes.

use rustc_hash::FxHashMap;

use crate::interner::NodeIdx;
use crate::models::Relationship;
use crate::{log_detail, log_summary, log_trace};

use super::graph::{Arc, ScheduleGraph};
use super::types::{CpmOptions, CpmResult, NodeTiming, ScheduleNode};

/// Earliest start the arc allows for its successor.
fn forward_candidate(arc: &Arc, pred_es: i64, pred_ef: i64, duration: i64) -> i64 {
    match arc.relationship {
        Relationship::FS => pred_ef.saturating_add(arc.lag),
        Relationship::SS => pred_es.saturating_add(arc.lag),
        Relationship::FF => pred_ef.saturating_add(arc.lag).saturating_sub(duration),
        Relationship::SF => pred_es.saturating_add(arc.lag).saturating_sub(duration),
    }
}

/// Latest finish the arc allows for its predecessor, given the successor's
/// late dates. Mirrors `forward_candidate` solved for the predecessor.
fn backward_candidate(arc: &Arc, succ_ls: i64, succ_lf: i64, pred_duration: i64) -> i64 {
    match arc.relationship {
        Relationship::FS => succ_ls.saturating_sub(arc.lag),
        Relationship::SS => succ_ls.saturating_sub(arc.lag).saturating_add(pred_duration),
        Relationship::FF => succ_lf.saturating_sub(arc.lag),
        Relationship::SF => succ_lf.saturating_sub(arc.lag).saturating_add(pred_duration),
    }
}

/// Run the full CPM over `nodes`.
///
/// Day arithmetic saturates at the `i64` bounds so extreme lags cannot
/// overflow.
///
/// Cycles are broken before scheduling (the closing edge of each cycle is
/// excluded and reported), edges with unknown ends are dropped, and every
/// node still gets a timing. Empty input yields an empty result.
pub fn calculate(nodes: &[ScheduleNode], options: &CpmOptions) -> CpmResult {
    let verbosity = options.verbosity;
    let (mut graph, dropped_edges) = ScheduleGraph::build(nodes);
    if graph.is_empty() {
        return CpmResult::default();
    }

    let removed_edges = graph.break_cycles();
    for cycle in &removed_edges {
        log_summary!(
            verbosity,
            "cycle {} -> excluded edge {} -> {}",
            cycle.cycle.join(" -> "),
            cycle.predecessor_id,
            cycle.target_id
        );
    }
    if dropped_edges > 0 {
        log_detail!(verbosity, "dropped {} unusable edges", dropped_edges);
    }

    let order = graph.topological_order();
    let n = graph.len();

    // Forward pass
    let mut early_start = vec![0i64; n];
    let mut early_finish = vec![0i64; n];
    let mut governing: Vec<Option<NodeIdx>> = vec![None; n];

    for &node in &order {
        let idx = node as usize;
        let duration = graph.durations[idx];
        let mut best: Option<(i64, NodeIdx)> = None;
        for &arc_idx in &graph.incoming[idx] {
            if !graph.active[arc_idx] {
                continue;
            }
            let arc = &graph.arcs[arc_idx];
            let pred = arc.pred as usize;
            let candidate =
                forward_candidate(arc, early_start[pred], early_finish[pred], duration);
            // Strict comparison keeps the first edge in input order on ties.
            if best.map_or(true, |(value, _)| candidate > value) {
                best = Some((candidate, arc.pred));
            }
        }
        let es = best.map_or(0, |(value, _)| value.max(0));
        governing[idx] = best.filter(|&(value, _)| value >= 0).map(|(_, pred)| pred);
        early_start[idx] = es;
        early_finish[idx] = es.saturating_add(duration);
        log_trace!(
            verbosity,
            "forward {}: es={} ef={}",
            graph.index.resolve(node).unwrap_or("?"),
            es,
            early_finish[idx]
        );
    }

    let project_finish = early_finish.iter().copied().max().unwrap_or(0);
    let finish_bound = options.target_finish.unwrap_or(project_finish);

    // Backward pass
    let mut late_start = vec![0i64; n];
    let mut late_finish = vec![0i64; n];

    for &node in order.iter().rev() {
        let idx = node as usize;
        let duration = graph.durations[idx];
        let mut lf = finish_bound;
        for &arc_idx in &graph.outgoing[idx] {
            if !graph.active[arc_idx] {
                continue;
            }
            let arc = &graph.arcs[arc_idx];
            let succ = arc.succ as usize;
            let candidate = backward_candidate(arc, late_start[succ], late_finish[succ], duration);
            lf = lf.min(candidate);
        }
        late_finish[idx] = lf;
        late_start[idx] = lf.saturating_sub(duration);
        log_trace!(
            verbosity,
            "backward {}: ls={} lf={}",
            graph.index.resolve(node).unwrap_or("?"),
            late_start[idx],
            lf
        );
    }

    let mut timings: FxHashMap<String, NodeTiming> =
        FxHashMap::with_capacity_and_hasher(n, Default::default());
    let mut ids = Vec::with_capacity(n);
    let mut critical_count = 0;

    for idx in 0..n {
        let id = graph.index.resolve(idx as NodeIdx).unwrap_or_default().to_string();
        let total_float = late_start[idx].saturating_sub(early_start[idx]);
        let is_critical = total_float <= 0;
        if is_critical {
            critical_count += 1;
        }
        timings.insert(
            id.clone(),
            NodeTiming {
                early_start: early_start[idx],
                early_finish: early_finish[idx],
                late_start: late_start[idx],
                late_finish: late_finish[idx],
                total_float,
                is_critical,
                governing_predecessor: governing[idx]
                    .and_then(|pred| graph.index.resolve(pred))
                    .map(|s| s.to_string()),
            },
        );
        ids.push(id);
    }

    let critical_chain = critical_chain(&graph, &early_finish, &governing, &timings, project_finish);

    log_summary!(
        verbosity,
        "cpm: {} nodes, {} critical, finish day {}, {} cycle edges removed",
        n,
        critical_count,
        project_finish,
        removed_edges.len()
    );

    CpmResult {
        timings,
        order: ids,
        project_finish,
        critical_count,
        removed_edges,
        dropped_edges,
        critical_chain,
    }
}

/// Walk governing predecessors back from the first node finishing at the
/// project finish, keeping only critical nodes. Returned start to finish.
fn critical_chain(
    graph: &ScheduleGraph,
    early_finish: &[i64],
    governing: &[Option<NodeIdx>],
    timings: &FxHashMap<String, NodeTiming>,
    project_finish: i64,
) -> Vec<String> {
    let is_critical = |idx: NodeIdx| {
        graph
            .index
            .resolve(idx)
            .and_then(|id| timings.get(id))
            .is_some_and(|t| t.is_critical)
    };

    let Some(end) = (0..graph.len())
        .map(|idx| idx as NodeIdx)
        .find(|&idx| early_finish[idx as usize] == project_finish && is_critical(idx))
    else {
        return Vec::new();
    };

    let mut chain = Vec::new();
    let mut current = Some(end);
    while let Some(idx) = current {
        if !is_critical(idx) {
            break;
        }
        if let Some(id) = graph.index.resolve(idx) {
            chain.push(id.to_string());
        }
        current = governing[idx as usize];
    }
    chain.reverse();
    chain
}
