//! Work breakdown flattening under an external expansion set.
//!
//! The forest is never mutated and carries no expand/collapse flags; which
//! nodes are open is a set of item ids owned by the caller. `flatten` is a
//! pure function of `(forest, expanded)` producing rows in depth-first
//! pre-order, the single ordering shared by the grid, the timeline canvas
//! and the edge router.

use chrono::{Duration, NaiveDate};
use rustc_hash::FxHashSet;
use std::collections::HashSet;
use std::hash::BuildHasher;

use crate::dependency::{declared_predecessors, normalize_id};
use crate::models::{clamp_days, FlatRow, HierarchyKind, WorkItem};

/// Explicit start, else baseline start.
fn own_start(item: &WorkItem) -> Option<NaiveDate> {
    item.start_date.or(item.baseline_start)
}

fn duration_hint(item: &WorkItem) -> Option<i64> {
    item.duration_days
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| clamp_days(d).max(1))
}

/// Explicit end, else baseline end, else start + max(1, duration hint).
/// `None` when that end would leave the representable date range.
fn own_end(item: &WorkItem, start: Option<NaiveDate>) -> Option<NaiveDate> {
    item.end_date.or(item.baseline_end).or_else(|| {
        let days = duration_hint(item).unwrap_or(1).max(1);
        let delta = Duration::try_days(days)?;
        start.and_then(|s| s.checked_add_signed(delta))
    })
}

/// Resolved whole-day duration, never below 1.
fn resolve_duration(item: &WorkItem, start: Option<NaiveDate>, end: Option<NaiveDate>) -> i64 {
    if let Some(hint) = duration_hint(item) {
        return hint;
    }
    match (start, end) {
        (Some(s), Some(e)) => (e - s).num_days().max(1),
        _ => 1,
    }
}

fn min_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn max_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

type Span = (Option<NaiveDate>, Option<NaiveDate>);

/// A node whose children are still being walked.
struct Frame<'f> {
    item: &'f WorkItem,
    id: String,
    slot: Option<usize>,
    level: u32,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    children_visible: bool,
    walk_children: bool,
    next_child: usize,
    child_span: Span,
}

struct Flattener<'a, S> {
    expanded: &'a HashSet<String, S>,
    rows: Vec<FlatRow>,
}

impl<S: BuildHasher> Flattener<'_, S> {
    /// Walk one root's subtree with an explicit stack so depth is bounded
    /// by the heap rather than the call stack.
    fn walk(&mut self, root: &WorkItem) {
        let mut stack = vec![self.enter(root, None, 1, true)];
        while let Some(top) = stack.last_mut() {
            if top.walk_children && top.next_child < top.item.children.len() {
                let item = top.item;
                let child = &item.children[top.next_child];
                top.next_child += 1;
                let frame = self.enter(child, Some(&top.id), top.level + 1, top.children_visible);
                stack.push(frame);
                continue;
            }
            let Some(done) = stack.pop() else { break };
            let (s, e) = self.finish(done);
            if let Some(parent) = stack.last_mut() {
                let (lo, hi) = parent.child_span;
                parent.child_span = (min_date(lo, s), max_date(hi, e));
            }
        }
    }

    /// Emit the row (pre-order) when visible and decide whether to descend.
    fn enter<'f>(
        &mut self,
        item: &'f WorkItem,
        parent_id: Option<&str>,
        level: u32,
        visible: bool,
    ) -> Frame<'f> {
        let id = normalize_id(&item.id);
        let has_children = !item.children.is_empty();
        let expanded = has_children && self.expanded.contains(&item.id);

        let slot = visible.then(|| {
            self.rows.push(make_row(item, &id, parent_id, level, expanded));
            self.rows.len() - 1
        });

        let start = own_start(item);
        let end = item.end_date.or(item.baseline_end);

        // Hidden subtrees are only walked when a summary needs rolled-up dates.
        let children_visible = visible && expanded;
        let needs_rollup = has_children && (start.is_none() || end.is_none());
        Frame {
            item,
            id,
            slot,
            level,
            start,
            end,
            children_visible,
            walk_children: children_visible || needs_rollup,
            next_child: 0,
            child_span: (None, None),
        }
    }

    /// Settle the node's dates once its children are done; returns its
    /// effective span for the parent's roll-up.
    fn finish(&mut self, frame: Frame<'_>) -> Span {
        let item = frame.item;
        let mut start = frame.start;
        let mut end = frame.end;
        if frame.walk_children {
            start = start.or(frame.child_span.0);
            end = end.or(frame.child_span.1);
        }

        let end = end.or_else(|| own_end(item, start));
        // An end before the start is malformed; collapse it onto the start.
        let end = match (start, end) {
            (Some(s), Some(e)) if e < s => Some(s),
            (_, e) => e,
        };

        if let Some(index) = frame.slot {
            let row = &mut self.rows[index];
            row.start = start;
            row.end = end;
            row.duration_days = resolve_duration(item, start, end);
        }
        (start, end)
    }
}

fn make_row(
    item: &WorkItem,
    id: &str,
    parent_id: Option<&str>,
    level: u32,
    expanded: bool,
) -> FlatRow {
    let (links, _) = declared_predecessors(item);
    FlatRow {
        id: id.to_string(),
        parent_id: parent_id.map(|p| p.to_string()),
        name: item.name.clone(),
        code: item.code.clone(),
        kind: HierarchyKind::classify(item.item_type.as_deref(), level),
        level,
        has_children: !item.children.is_empty(),
        expanded,
        start: None,
        end: None,
        duration_days: 1,
        percent_complete: item.percent_complete,
        baseline_hours: item.baseline_hours,
        actual_hours: item.actual_hours,
        projected_hours: item.projected_hours,
        remaining_hours: item.remaining_hours,
        baseline_cost: item.baseline_cost,
        actual_cost: item.actual_cost,
        remaining_cost: item.remaining_cost,
        predecessor_ids: links.into_iter().map(|l| l.predecessor_id).collect(),
        total_float: None,
        is_critical: false,
    }
}

/// Flatten the forest into visible rows, depth-first pre-order.
///
/// A node is emitted only when every ancestor is in `expanded`; its own
/// membership only controls its children. Roots are level 1.
pub fn flatten<S: BuildHasher>(forest: &[WorkItem], expanded: &HashSet<String, S>) -> Vec<FlatRow> {
    let mut flattener = Flattener {
        expanded,
        rows: Vec::new(),
    };
    for root in forest {
        flattener.walk(root);
    }
    flattener.rows
}

fn walk_with_depth(forest: &[WorkItem], mut visit: impl FnMut(&WorkItem, u32)) {
    let mut stack: Vec<(&WorkItem, u32)> = forest.iter().rev().map(|item| (item, 1)).collect();
    while let Some((item, depth)) = stack.pop() {
        visit(item, depth);
        stack.extend(item.children.iter().rev().map(|child| (child, depth + 1)));
    }
}

/// Ids of every node that has at least one child.
pub fn expand_all(forest: &[WorkItem]) -> FxHashSet<String> {
    let mut ids = FxHashSet::default();
    walk_with_depth(forest, |item, _| {
        if !item.children.is_empty() {
            ids.insert(item.id.clone());
        }
    });
    ids
}

/// Ids of nodes with children shallower than `level`, so the resulting
/// flatten is at most `level` levels deep.
pub fn collapse_to_level(forest: &[WorkItem], level: u32) -> FxHashSet<String> {
    let mut ids = FxHashSet::default();
    walk_with_depth(forest, |item, depth| {
        if !item.children.is_empty() && depth < level {
            ids.insert(item.id.clone());
        }
    });
    ids
}

pub fn count_nodes(forest: &[WorkItem]) -> usize {
    let mut count = 0;
    walk_with_depth(forest, |_, _| count += 1);
    count
}

/// Node counts by hierarchy kind over the whole forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyCounts {
    pub projects: usize,
    pub units: usize,
    pub phases: usize,
    pub tasks: usize,
}

pub fn hierarchy_counts(forest: &[WorkItem]) -> HierarchyCounts {
    let mut counts = HierarchyCounts::default();
    walk_with_depth(forest, |item, depth| {
        match HierarchyKind::classify(item.item_type.as_deref(), depth) {
            HierarchyKind::Project => counts.projects += 1,
            HierarchyKind::Unit => counts.units += 1,
            HierarchyKind::Phase => counts.phases += 1,
            HierarchyKind::Task => counts.tasks += 1,
        }
    });
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_SPAN_DAYS;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_item(id: &str, children: Vec<WorkItem>) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            name: format!("Item {}", id),
            children,
            ..WorkItem::default()
        }
    }

    fn dated(id: &str, start: NaiveDate, end: Option<NaiveDate>, hint: Option<f64>) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            start_date: Some(start),
            end_date: end,
            duration_days: hint,
            ..WorkItem::default()
        }
    }

    /// p1 -> (u1 -> (t1, t2), u2 -> (t3)), p2
    fn sample_forest() -> Vec<WorkItem> {
        vec![
            make_item(
                "p1",
                vec![
                    make_item("u1", vec![make_item("t1", vec![]), make_item("t2", vec![])]),
                    make_item("u2", vec![make_item("t3", vec![])]),
                ],
            ),
            make_item("p2", vec![]),
        ]
    }

    fn ids(rows: &[FlatRow]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    fn set(items: &[&str]) -> FxHashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collapsed_shows_roots_only() {
        let rows = flatten(&sample_forest(), &set(&[]));
        assert_eq!(ids(&rows), vec!["p1", "p2"]);
        assert!(rows[0].has_children);
        assert!(!rows[0].expanded);
        assert!(!rows[1].has_children);
    }

    #[test]
    fn test_preorder_with_levels() {
        let forest = sample_forest();
        let rows = flatten(&forest, &expand_all(&forest));
        assert_eq!(ids(&rows), vec!["p1", "u1", "t1", "t2", "u2", "t3", "p2"]);
        let levels: Vec<u32> = rows.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![1, 2, 3, 3, 2, 3, 1]);
        assert_eq!(rows[2].parent_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_child_hidden_when_ancestor_collapsed() {
        // u1 is marked expanded but its parent p1 is not
        let rows = flatten(&sample_forest(), &set(&["u1"]));
        assert_eq!(ids(&rows), vec!["p1", "p2"]);

        let rows = flatten(&sample_forest(), &set(&["p1", "u1"]));
        assert_eq!(ids(&rows), vec!["p1", "u1", "t1", "t2", "u2", "p2"]);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let forest = sample_forest();
        let expanded = set(&["p1", "u2"]);
        assert_eq!(flatten(&forest, &expanded), flatten(&forest, &expanded));
    }

    #[test]
    fn test_expand_all_row_count_matches_nodes() {
        let forest = sample_forest();
        assert_eq!(flatten(&forest, &expand_all(&forest)).len(), count_nodes(&forest));
        assert_eq!(count_nodes(&forest), 7);
    }

    #[test]
    fn test_collapse_to_level() {
        let forest = sample_forest();
        assert_eq!(
            flatten(&forest, &collapse_to_level(&forest, 1)),
            flatten(&forest, &set(&[]))
        );
        let rows = flatten(&forest, &collapse_to_level(&forest, 2));
        assert_eq!(ids(&rows), vec!["p1", "u1", "u2", "p2"]);
        assert!(rows.iter().all(|r| r.level <= 2));
    }

    #[test]
    fn test_accepts_std_hash_set() {
        let expanded: HashSet<String> = ["p1".to_string()].into_iter().collect();
        assert_eq!(flatten(&sample_forest(), &expanded).len(), 4);
    }

    #[test]
    fn test_effective_dates() {
        let forest = vec![
            dated("explicit", date(2025, 1, 1), Some(date(2025, 1, 11)), None),
            dated("hinted", date(2025, 1, 1), None, Some(4.0)),
            dated("bare", date(2025, 1, 1), None, None),
            WorkItem {
                id: "baseline".to_string(),
                baseline_start: Some(date(2025, 2, 1)),
                baseline_end: Some(date(2025, 2, 3)),
                ..WorkItem::default()
            },
            make_item("undated", vec![]),
        ];
        let rows = flatten(&forest, &set(&[]));

        assert_eq!(rows[0].end, Some(date(2025, 1, 11)));
        assert_eq!(rows[0].duration_days, 10);
        assert_eq!(rows[1].end, Some(date(2025, 1, 5)));
        assert_eq!(rows[1].duration_days, 4);
        assert_eq!(rows[2].end, Some(date(2025, 1, 2)));
        assert_eq!(rows[2].duration_days, 1);
        assert_eq!(rows[3].start, Some(date(2025, 2, 1)));
        assert_eq!(rows[3].duration_days, 2);
        assert_eq!(rows[4].start, None);
        assert_eq!(rows[4].end, None);
        assert_eq!(rows[4].duration_days, 1);
    }

    #[test]
    fn test_inverted_dates_collapse() {
        let forest = vec![dated("x", date(2025, 3, 10), Some(date(2025, 3, 1)), None)];
        let rows = flatten(&forest, &set(&[]));
        assert_eq!(rows[0].end, Some(date(2025, 3, 10)));
        assert_eq!(rows[0].duration_days, 1);
    }

    #[test]
    fn test_summary_rolls_up_hidden_children() {
        let forest = vec![make_item(
            "summary",
            vec![
                dated("a", date(2025, 1, 6), Some(date(2025, 1, 10)), None),
                dated("b", date(2025, 1, 3), Some(date(2025, 1, 20)), None),
            ],
        )];
        let rows = flatten(&forest, &set(&[]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start, Some(date(2025, 1, 3)));
        assert_eq!(rows[0].end, Some(date(2025, 1, 20)));
        assert_eq!(rows[0].duration_days, 17);
    }

    #[test]
    fn test_row_carries_normalized_predecessors() {
        let forest = vec![WorkItem {
            id: "task-9".to_string(),
            predecessor_text: Some("task-3FS+1;4".to_string()),
            actual_hours: 6.0,
            ..WorkItem::default()
        }];
        let rows = flatten(&forest, &set(&[]));
        assert_eq!(rows[0].id, "9");
        assert_eq!(rows[0].predecessor_ids, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(rows[0].actual_hours, 6.0);
        assert_eq!(rows[0].total_float, None);
    }

    #[test]
    fn test_hierarchy_counts() {
        let counts = hierarchy_counts(&sample_forest());
        assert_eq!(
            counts,
            HierarchyCounts {
                projects: 2,
                units: 2,
                phases: 3,
                tasks: 0,
            }
        );
    }

    #[test]
    fn test_empty_forest() {
        assert!(flatten(&[], &set(&[])).is_empty());
        assert!(expand_all(&[]).is_empty());
        assert_eq!(count_nodes(&[]), 0);
    }

    #[test]
    fn test_huge_duration_hint_clamped() {
        let forest = vec![
            dated("huge", date(2025, 1, 1), None, Some(1e15)),
            dated("edge", NaiveDate::MAX, None, Some(5.0)),
        ];
        let rows = flatten(&forest, &set(&[]));
        assert_eq!(rows[0].duration_days, MAX_SPAN_DAYS);
        assert_eq!(
            rows[0].end,
            date(2025, 1, 1).checked_add_signed(Duration::days(MAX_SPAN_DAYS))
        );
        // past the calendar's last day: no end, duration still from the hint
        assert_eq!(rows[1].end, None);
        assert_eq!(rows[1].duration_days, 5);
    }

    #[test]
    fn test_deep_chain_flattens() {
        let depth = 50_000;
        let mut node = make_item(&format!("n{}", depth), vec![]);
        for i in (1..depth).rev() {
            node = make_item(&format!("n{}", i), vec![node]);
        }
        let mut forest = vec![node];

        let rows = flatten(&forest, &expand_all(&forest));
        assert_eq!(rows.len(), depth);
        assert_eq!(rows[depth - 1].level, depth as u32);
        assert_eq!(rows[depth - 1].parent_id.as_deref(), Some("n49999"));

        let rows = flatten(&forest, &set(&[]));
        assert_eq!(ids(&rows), vec!["n1"]);

        // drop level by level; the derived drop would recurse
        let mut pending = std::mem::take(&mut forest);
        while let Some(mut item) = pending.pop() {
            pending.append(&mut item.children);
        }
    }
}
