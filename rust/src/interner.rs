//! Row id interning for the CPM graph.
//!
//! Schedule nodes and edges are stored as dense `u32` indices so the passes
//! work on plain vectors; strings only appear at the boundary.

use rustc_hash::FxHashMap;

/// Dense node index (position in input order).
pub type NodeIdx = u32;

/// Bidirectional map between row ids and dense node indices.
///
/// Indices are handed out in first-seen order, which is the input order the
/// engine uses for every tie-break.
#[derive(Debug, Clone, Default)]
pub struct NodeInterner {
    to_idx: FxHashMap<String, NodeIdx>,
    ids: Vec<String>,
}

impl NodeInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_idx: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Intern an id, returning `(index, newly_inserted)`.
    pub fn intern(&mut self, id: &str) -> (NodeIdx, bool) {
        if let Some(&idx) = self.to_idx.get(id) {
            return (idx, false);
        }
        let idx = self.ids.len() as NodeIdx;
        self.ids.push(id.to_string());
        self.to_idx.insert(id.to_string(), idx);
        (idx, true)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<NodeIdx> {
        self.to_idx.get(id).copied()
    }

    #[inline]
    pub fn resolve(&self, idx: NodeIdx) -> Option<&str> {
        self.ids.get(idx as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
