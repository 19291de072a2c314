//! Dependency resolution: raw predecessor data to normalized edges.
//!
//! Links come from three places on a work item: structured predecessor
//! records, a delimited predecessor text field ("101FS+2;102SS-1"), and
//! structured successor records that point the other way. All of them are
//! normalized into [`DependencyEdge`]s keyed by target id.
//!
//! Nothing here fails. Bad tokens, dangling ids and self references are
//! recorded in a [`ResolutionReport`] and the offending link is dropped.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::models::{clamp_days, DependencyEdge, LinkRecord, Relationship, WorkItem};

/// Structural prefixes that different exporters put in front of the same id.
const STRUCTURAL_PREFIXES: &[&str] = &["task-", "task_", "outline-", "row-", "uid-", "wbs-"];

/// A problem found while resolving links. Reported, never raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkIssue {
    #[error("task {target}: cannot parse predecessor token `{token}`")]
    Unparseable { target: String, token: String },
    #[error("task {target}: predecessor {predecessor} is not loaded")]
    Dangling { target: String, predecessor: String },
    #[error("task {source_id}: successor {successor} is not loaded")]
    UnknownSuccessor { source_id: String, successor: String },
    #[error("task {target}: depends on itself")]
    SelfReference { target: String },
    #[error("task {target}: duplicate link from {predecessor}")]
    Duplicate { target: String, predecessor: String },
}

/// Everything that was dropped or left unresolved during one resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionReport {
    pub issues: Vec<LinkIssue>,
}

impl ResolutionReport {
    /// Edges whose predecessor does not exist among the loaded rows.
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.issues.iter().filter_map(|issue| match issue {
            LinkIssue::Dangling {
                target,
                predecessor,
            } => Some((target.as_str(), predecessor.as_str())),
            _ => None,
        })
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved().count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Link coverage statistics over the whole forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyCoverage {
    pub total_predecessor_links: usize,
    pub total_successor_links: usize,
    pub tasks_with_predecessors: usize,
    pub tasks_with_successors: usize,
    pub leaf_tasks: usize,
    pub linked_leaf_tasks: usize,
    pub isolated_leaf_tasks: usize,
    /// Linked leaves as a percentage of all leaves, two decimal places.
    pub coverage_percent: f64,
}

/// One link parsed from an item, before resolution against the loaded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    pub predecessor_id: String,
    pub relationship: Relationship,
    pub lag_days: i64,
    pub external: bool,
}

/// Strip structural prefixes so ids from different sources compare equal.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    for prefix in STRUCTURAL_PREFIXES {
        if lower.starts_with(prefix) && trimmed.len() > prefix.len() {
            return trimmed[prefix.len()..].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Parse a lag suffix such as "+2", "-1", "+3d", " + 4 days". Empty is 0.
fn parse_lag(text: &str) -> Option<i64> {
    let mut s = text.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Some(0);
    }
    for suffix in ["edays", "days", "day", "ed", "d"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.trim_end().to_string();
            break;
        }
    }
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let value: f64 = compact.parse().ok()?;
    value.is_finite().then(|| clamp_days(value))
}

/// Parse one token into `(id, relationship, lag)`.
fn parse_token(token: &str) -> Option<(String, Relationship, i64)> {
    // Rightmost relationship code whose remainder is a valid lag.
    for (i, _) in token.char_indices().rev() {
        let Some(code) = token.get(i..i + 2) else {
            continue;
        };
        let Some(relationship) = Relationship::from_code(code) else {
            continue;
        };
        let Some(lag) = parse_lag(&token[i + 2..]) else {
            continue;
        };
        match token[..i].chars().last() {
            // A code with nothing in front of it ("FS+2").
            None => return None,
            Some(c) if c.is_ascii_digit() || c.is_whitespace() => {}
            // Letters in front belong to the id ("process", "staff").
            Some(_) => continue,
        }
        let id = token[..i].trim();
        if id.is_empty() {
            return None;
        }
        return Some((normalize_id(id), relationship, lag));
    }

    // Bare numeric ids may carry a lag without a code ("101+2").
    if let Some(pos) = token.find(['+', '-']) {
        let id = token[..pos].trim();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return parse_lag(&token[pos..]).map(|lag| (id.to_string(), Relationship::FS, lag));
        }
    }

    let id = normalize_id(token);
    (!id.is_empty() && id.chars().any(|c| c.is_alphanumeric()))
        .then_some((id, Relationship::FS, 0))
}

/// Split a delimited predecessor field into links and unparseable tokens.
pub fn parse_predecessor_text(text: &str) -> (Vec<ParsedLink>, Vec<String>) {
    let mut links = Vec::new();
    let mut bad = Vec::new();
    for token in text.split([';', ',']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match parse_token(token) {
            Some((predecessor_id, relationship, lag_days)) => links.push(ParsedLink {
                predecessor_id,
                relationship,
                lag_days,
                external: false,
            }),
            None => bad.push(token.to_string()),
        }
    }
    (links, bad)
}

fn link_from_record(record: &LinkRecord) -> Option<ParsedLink> {
    let predecessor_id = normalize_id(&record.task_id);
    if predecessor_id.is_empty() {
        return None;
    }
    Some(ParsedLink {
        predecessor_id,
        relationship: Relationship::normalize(&record.relationship),
        lag_days: if record.lag_days.is_finite() {
            clamp_days(record.lag_days)
        } else {
            0
        },
        external: record.is_external,
    })
}

/// Predecessor links declared on an item, in declaration order, with
/// duplicates and self references removed.
///
/// Structured records take precedence over the text field.
pub fn declared_predecessors(item: &WorkItem) -> (Vec<ParsedLink>, Vec<LinkIssue>) {
    let target = normalize_id(&item.id);
    let mut issues = Vec::new();

    let raw: Vec<ParsedLink> = if !item.predecessors.is_empty() {
        item.predecessors
            .iter()
            .filter_map(|record| {
                let link = link_from_record(record);
                if link.is_none() {
                    issues.push(LinkIssue::Unparseable {
                        target: target.clone(),
                        token: record.task_id.clone(),
                    });
                }
                link
            })
            .collect()
    } else if let Some(text) = item.predecessor_text.as_deref() {
        let (links, bad) = parse_predecessor_text(text);
        issues.extend(bad.into_iter().map(|token| LinkIssue::Unparseable {
            target: target.clone(),
            token,
        }));
        links
    } else {
        Vec::new()
    };

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut links = Vec::with_capacity(raw.len());
    for link in raw {
        if link.predecessor_id == target {
            issues.push(LinkIssue::SelfReference {
                target: target.clone(),
            });
            continue;
        }
        if !seen.insert(link.predecessor_id.clone()) {
            issues.push(LinkIssue::Duplicate {
                target: target.clone(),
                predecessor: link.predecessor_id,
            });
            continue;
        }
        links.push(link);
    }
    (links, issues)
}

/// Normalized edges for a whole forest, keyed by target id.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLinks {
    incoming: FxHashMap<String, Vec<DependencyEdge>>,
    /// Target ids in first-declared order, for deterministic iteration.
    targets: Vec<String>,
    pub report: ResolutionReport,
    pub coverage: DependencyCoverage,
}

impl ResolvedLinks {
    /// Incoming edges of `target_id` (normalized), in declaration order.
    pub fn incoming(&self, target_id: &str) -> &[DependencyEdge] {
        self.incoming
            .get(target_id)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }

    /// All edges, grouped by target in first-declared order.
    pub fn iter(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.targets
            .iter()
            .filter_map(|t| self.incoming.get(t))
            .flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.incoming.values().map(|edges| edges.len()).sum()
    }

    fn push(&mut self, edge: DependencyEdge) -> bool {
        if !self.incoming.contains_key(&edge.target_id) {
            self.targets.push(edge.target_id.clone());
        }
        let list = self.incoming.entry(edge.target_id.clone()).or_default();
        if list.iter().any(|e| e.predecessor_id == edge.predecessor_id) {
            return false;
        }
        list.push(edge);
        true
    }
}

fn walk_preorder<'a>(forest: &'a [WorkItem], mut visit: impl FnMut(&'a WorkItem)) {
    let mut stack: Vec<&WorkItem> = forest.iter().rev().collect();
    while let Some(item) = stack.pop() {
        visit(item);
        stack.extend(item.children.iter().rev());
    }
}

/// Resolve every link in the forest against the set of loaded ids.
pub fn resolve_links(forest: &[WorkItem]) -> ResolvedLinks {
    let mut loaded: FxHashSet<String> = FxHashSet::default();
    let mut leaves: Vec<String> = Vec::new();
    walk_preorder(forest, |item| {
        let id = normalize_id(&item.id);
        if item.children.is_empty() {
            leaves.push(id.clone());
        }
        loaded.insert(id);
    });

    let mut resolved = ResolvedLinks::default();
    let mut predecessor_links = 0usize;
    let mut successor_links = 0usize;

    walk_preorder(forest, |item| {
        let target = normalize_id(&item.id);
        let (links, issues) = declared_predecessors(item);
        resolved.report.issues.extend(issues);
        predecessor_links += links.len();
        for link in links {
            let is_loaded = loaded.contains(&link.predecessor_id);
            if !is_loaded {
                resolved.report.issues.push(LinkIssue::Dangling {
                    target: target.clone(),
                    predecessor: link.predecessor_id.clone(),
                });
            }
            resolved.push(DependencyEdge {
                target_id: target.clone(),
                predecessor_id: link.predecessor_id,
                relationship: link.relationship,
                lag_days: link.lag_days,
                resolved: is_loaded,
                external: link.external,
            });
        }
    });

    // Successor records are mirrored onto their targets; a pair already
    // declared from the predecessor side keeps its first declaration.
    walk_preorder(forest, |item| {
        let source = normalize_id(&item.id);
        for record in &item.successors {
            let Some(link) = link_from_record(record) else {
                continue;
            };
            successor_links += 1;
            let successor = link.predecessor_id;
            if successor == source {
                resolved.report.issues.push(LinkIssue::SelfReference {
                    target: source.clone(),
                });
                continue;
            }
            if !loaded.contains(&successor) {
                resolved.report.issues.push(LinkIssue::UnknownSuccessor {
                    source_id: source.clone(),
                    successor,
                });
                continue;
            }
            resolved.push(DependencyEdge {
                target_id: successor,
                predecessor_id: source.clone(),
                relationship: link.relationship,
                lag_days: link.lag_days,
                resolved: true,
                external: link.external,
            });
        }
    });

    resolved.coverage = coverage(&resolved, &leaves, predecessor_links, successor_links);
    resolved
}

fn coverage(
    resolved: &ResolvedLinks,
    leaves: &[String],
    total_predecessor_links: usize,
    total_successor_links: usize,
) -> DependencyCoverage {
    let mut with_predecessors: FxHashSet<&str> = FxHashSet::default();
    let mut with_successors: FxHashSet<&str> = FxHashSet::default();
    for edge in resolved.iter() {
        with_predecessors.insert(edge.target_id.as_str());
        if edge.resolved {
            with_successors.insert(edge.predecessor_id.as_str());
        }
    }

    let linked_leaf_tasks = leaves
        .iter()
        .filter(|id| {
            with_predecessors.contains(id.as_str()) || with_successors.contains(id.as_str())
        })
        .count();
    let coverage_percent = if leaves.is_empty() {
        0.0
    } else {
        (linked_leaf_tasks as f64 / leaves.len() as f64 * 10_000.0).round() / 100.0
    };

    DependencyCoverage {
        total_predecessor_links,
        total_successor_links,
        tasks_with_predecessors: with_predecessors.len(),
        tasks_with_successors: with_successors.len(),
        leaf_tasks: leaves.len(),
        linked_leaf_tasks,
        isolated_leaf_tasks: leaves.len() - linked_leaf_tasks,
        coverage_percent,
    }
}
