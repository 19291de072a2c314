//! Critical path method over the flattened work breakdown.
//!
//! Nodes are interned to dense indices, cycles are broken by dropping the
//! edge that closes each one, and forward/backward passes run in a
//! deterministic topological order. All times are whole days from the
//! project origin.

mod calculation;
mod graph;
mod types;

pub use calculation::calculate;
pub use graph::{Arc, ScheduleGraph};
pub use types::{CpmOptions, CpmResult, CycleEdge, NodeTiming, ScheduleNode};
