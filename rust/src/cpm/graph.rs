//! Index-based dependency graph: construction, cycle breaking, ordering.

use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::interner::{NodeIdx, NodeInterner};
use crate::models::{Relationship, MAX_SPAN_DAYS};

use super::types::{CycleEdge, ScheduleNode};

/// One usable edge between two scheduled nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arc {
    pub pred: NodeIdx,
    pub succ: NodeIdx,
    pub relationship: Relationship,
    pub lag: i64,
}

/// Adjacency over dense node indices. Arc indices follow input order.
#[derive(Clone, Debug, Default)]
pub struct ScheduleGraph {
    pub index: NodeInterner,
    pub durations: Vec<i64>,
    pub arcs: Vec<Arc>,
    /// Arc indices into each node, in input order.
    pub incoming: Vec<Vec<usize>>,
    /// Arc indices out of each node, in input order.
    pub outgoing: Vec<Vec<usize>>,
    /// Cleared for arcs removed by cycle breaking.
    pub active: Vec<bool>,
}

impl ScheduleGraph {
    /// Build the graph; returns it with the number of edges that were dropped
    /// (unresolved, unknown end, self loop or repeated pair).
    pub fn build(nodes: &[ScheduleNode]) -> (Self, usize) {
        let mut index = NodeInterner::with_capacity(nodes.len());
        let mut durations = Vec::with_capacity(nodes.len());
        let mut owners: Vec<&ScheduleNode> = Vec::with_capacity(nodes.len());
        for node in nodes {
            // Repeated ids keep their first occurrence.
            if index.intern(&node.id).1 {
                durations.push(node.duration.max(1));
                owners.push(node);
            }
        }

        let n = index.len();
        let mut arcs = Vec::new();
        let mut incoming = vec![Vec::new(); n];
        let mut outgoing = vec![Vec::new(); n];
        let mut seen: FxHashSet<(NodeIdx, NodeIdx)> = FxHashSet::default();
        let mut dropped = 0;

        for (succ, node) in owners.iter().enumerate() {
            let succ = succ as NodeIdx;
            for edge in &node.incoming {
                let pred = match index.get(&edge.predecessor_id) {
                    Some(pred) if edge.resolved && pred != succ => pred,
                    _ => {
                        dropped += 1;
                        continue;
                    }
                };
                if !seen.insert((pred, succ)) {
                    dropped += 1;
                    continue;
                }
                let arc_idx = arcs.len();
                arcs.push(Arc {
                    pred,
                    succ,
                    relationship: edge.relationship,
                    lag: edge.lag_days.clamp(-MAX_SPAN_DAYS, MAX_SPAN_DAYS),
                });
                incoming[succ as usize].push(arc_idx);
                outgoing[pred as usize].push(arc_idx);
            }
        }

        let active = vec![true; arcs.len()];
        (
            Self {
                index,
                durations,
                arcs,
                incoming,
                outgoing,
                active,
            },
            dropped,
        )
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    fn id(&self, idx: NodeIdx) -> String {
        self.index.resolve(idx).unwrap_or_default().to_string()
    }

    /// Deactivate every arc that closes a cycle.
    ///
    /// Iterative depth-first search with three-color marking, roots and
    /// successors visited in input order. Each back edge found is removed;
    /// the remaining active arcs form a DAG.
    pub fn break_cycles(&mut self) -> Vec<CycleEdge> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let n = self.len();
        let mut color = vec![WHITE; n];
        let mut removed = Vec::new();
        // (node, position in its outgoing list)
        let mut stack: Vec<(NodeIdx, usize)> = Vec::new();

        for root in 0..n {
            if color[root] != WHITE {
                continue;
            }
            color[root] = GRAY;
            stack.push((root as NodeIdx, 0));

            while let Some(top) = stack.last_mut() {
                let (node, pos) = *top;
                top.1 += 1;
                let Some(&arc_idx) = self.outgoing[node as usize].get(pos) else {
                    color[node as usize] = BLACK;
                    stack.pop();
                    continue;
                };
                if !self.active[arc_idx] {
                    continue;
                }
                let succ = self.arcs[arc_idx].succ;
                match color[succ as usize] {
                    WHITE => {
                        color[succ as usize] = GRAY;
                        stack.push((succ, 0));
                    }
                    GRAY => {
                        self.active[arc_idx] = false;
                        let start = stack
                            .iter()
                            .position(|&(idx, _)| idx == succ)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|&(idx, _)| self.id(idx)).collect();
                        cycle.push(self.id(succ));
                        removed.push(CycleEdge {
                            predecessor_id: self.id(node),
                            target_id: self.id(succ),
                            cycle,
                        });
                    }
                    _ => {}
                }
            }
        }
        removed
    }

    /// Kahn's algorithm over active arcs. Among ready nodes the lowest input
    /// index goes first, so the order is fully determined by the input.
    pub fn topological_order(&self) -> Vec<NodeIdx> {
        let n = self.len();
        let mut in_degree = vec![0usize; n];
        for (arc, &active) in self.arcs.iter().zip(&self.active) {
            if active {
                in_degree[arc.succ as usize] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<NodeIdx>> = (0..n as NodeIdx)
            .filter(|&idx| in_degree[idx as usize] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        let mut placed = vec![false; n];

        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            placed[node as usize] = true;
            for &arc_idx in &self.outgoing[node as usize] {
                if !self.active[arc_idx] {
                    continue;
                }
                let succ = self.arcs[arc_idx].succ as usize;
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ as NodeIdx));
                }
            }
        }

        // Only reachable if cycles were not broken first.
        if order.len() < n {
            order.extend((0..n as NodeIdx).filter(|&idx| !placed[idx as usize]));
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DependencyEdge;

    fn edge(target: &str, pred: &str) -> DependencyEdge {
        DependencyEdge {
            target_id: target.to_string(),
            predecessor_id: pred.to_string(),
            relationship: Relationship::FS,
            lag_days: 0,
            resolved: true,
            external: false,
        }
    }

    fn node(id: &str, preds: &[&str]) -> ScheduleNode {
        ScheduleNode::new(id, 1, preds.iter().map(|p| edge(id, p)).collect())
    }

    fn names(graph: &ScheduleGraph, order: &[NodeIdx]) -> Vec<String> {
        order.iter().map(|&idx| graph.id(idx)).collect()
    }

    #[test]
    fn test_build_drops_unknown_self_and_repeated() {
        let mut unresolved = edge("b", "a");
        unresolved.resolved = false;
        let nodes = vec![
            node("a", &["ghost", "a"]),
            ScheduleNode::new("b", 1, vec![edge("b", "a"), edge("b", "a"), unresolved]),
        ];
        let (graph, dropped) = ScheduleGraph::build(&nodes);
        assert_eq!(graph.arcs.len(), 1);
        assert_eq!(dropped, 4);
    }

    #[test]
    fn test_topological_order_prefers_input_order() {
        // c depends on a; b is free. Ready set {a, b} -> a first, then b, then c
        let nodes = vec![node("a", &[]), node("b", &[]), node("c", &["a"])];
        let (graph, _) = ScheduleGraph::build(&nodes);
        assert_eq!(names(&graph, &graph.topological_order()), vec!["a", "b", "c"]);

        // Declared out of order: consumer first
        let nodes = vec![node("c", &["b"]), node("b", &["a"]), node("a", &[])];
        let (graph, _) = ScheduleGraph::build(&nodes);
        assert_eq!(names(&graph, &graph.topological_order()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_two_node_cycle_broken() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        let (mut graph, _) = ScheduleGraph::build(&nodes);
        let removed = graph.break_cycles();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].cycle.first(), removed[0].cycle.last());
        assert_eq!(graph.active.iter().filter(|&&a| a).count(), 1);
        assert_eq!(graph.topological_order().len(), 2);
    }

    #[test]
    fn test_three_node_cycle_reports_path() {
        // a -> b -> c -> a
        let nodes = vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])];
        let (mut graph, _) = ScheduleGraph::build(&nodes);
        let removed = graph.break_cycles();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].predecessor_id, "c");
        assert_eq!(removed[0].target_id, "a");
        assert_eq!(removed[0].cycle, vec!["a", "b", "c", "a"]);
        assert_eq!(names(&graph, &graph.topological_order()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_acyclic_graph_untouched() {
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ];
        let (mut graph, dropped) = ScheduleGraph::build(&nodes);
        assert_eq!(dropped, 0);
        assert!(graph.break_cycles().is_empty());
        assert!(graph.active.iter().all(|&a| a));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let n = 50_000;
        let nodes: Vec<ScheduleNode> = (0..n)
            .map(|i| {
                let id = i.to_string();
                if i == 0 {
                    node(&id, &[])
                } else {
                    let pred = (i - 1).to_string();
                    node(&id, &[pred.as_str()])
                }
            })
            .collect();
        let (mut graph, _) = ScheduleGraph::build(&nodes);
        assert!(graph.break_cycles().is_empty());
        assert_eq!(graph.topological_order().len(), n);
    }
}
