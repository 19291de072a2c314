//! Frame to draw instructions.
//!
//! The renderer is a pure function of a [`ScheduleFrame`]; the graphics
//! backend only replays the instruction list. Only rows inside the viewport
//! window produce bars, and an arrow is emitted only when its target row is
//! in the window and its source row has a display index.

use chrono::NaiveDate;
use rustc_hash::FxHashSet;

use crate::frame::ScheduleFrame;
use crate::models::{FlatRow, Relationship};

/// Bars fill this share of the row height, centered.
const BAR_FILL: f64 = 0.6;

/// One backend-independent drawing primitive, in canvas coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawInstruction {
    RowBand {
        index: usize,
        y: f64,
        height: f64,
        level: u32,
        summary: bool,
    },
    GridLine {
        x: f64,
        major: bool,
    },
    TickLabel {
        x: f64,
        label: String,
        major: bool,
    },
    TodayLine {
        x: f64,
    },
    Bar {
        row_id: String,
        index: usize,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        /// Completed share, 0.0 to 1.0.
        progress: f64,
        summary: bool,
        critical: bool,
    },
    Milestone {
        row_id: String,
        index: usize,
        x: f64,
        y: f64,
        size: f64,
        critical: bool,
    },
    Arrow {
        source_id: String,
        target_id: String,
        /// Orthogonal polyline from source anchor to target anchor.
        points: Vec<(f64, f64)>,
        relationship: Relationship,
        critical: bool,
    },
}

/// Horizontal extent of a drawn row.
#[derive(Clone, Copy, Debug)]
struct BarSpan {
    start_x: f64,
    end_x: f64,
}

fn bar_span(frame: &ScheduleFrame, row: &FlatRow) -> Option<BarSpan> {
    let (start, end): (NaiveDate, NaiveDate) = frame.bar_dates(row)?;
    let start_x = frame.mapper.to_x(start);
    Some(BarSpan {
        start_x,
        end_x: frame.mapper.to_x(end).max(start_x),
    })
}

/// Produce the full instruction list for one frame.
///
/// Order: row bands, grid lines, tick labels, today line, bars, arrows.
pub fn render(frame: &ScheduleFrame) -> Vec<DrawInstruction> {
    let viewport = &frame.viewport;
    let row_height = viewport.row_height;
    let mut out = Vec::new();

    for (index, row) in frame.windowed_rows() {
        out.push(DrawInstruction::RowBand {
            index,
            y: viewport.row_top(index),
            height: row_height,
            level: row.level,
            summary: row.has_children,
        });
    }

    for tick in &frame.ticks {
        out.push(DrawInstruction::GridLine {
            x: tick.x,
            major: tick.major,
        });
    }
    for tick in &frame.ticks {
        out.push(DrawInstruction::TickLabel {
            x: tick.x,
            label: tick.label.clone(),
            major: tick.major,
        });
    }

    if frame.mapper.range.contains(frame.today) {
        out.push(DrawInstruction::TodayLine {
            x: frame.mapper.to_x(frame.today),
        });
    }

    for (index, row) in frame.windowed_rows() {
        let Some(span) = bar_span(frame, row) else {
            continue;
        };
        if row.is_milestone() {
            out.push(DrawInstruction::Milestone {
                row_id: row.id.clone(),
                index,
                x: span.start_x,
                y: viewport.row_center(index),
                size: row_height * BAR_FILL,
                critical: row.is_critical,
            });
        } else {
            let height = row_height * BAR_FILL;
            out.push(DrawInstruction::Bar {
                row_id: row.id.clone(),
                index,
                x: span.start_x,
                y: viewport.row_center(index) - height / 2.0,
                width: span.end_x - span.start_x,
                height,
                progress: (row.percent_complete / 100.0).clamp(0.0, 1.0),
                summary: row.has_children,
                critical: row.is_critical,
            });
        }
    }

    out.extend(route_edges(frame));
    out
}

/// Arrows for every drawable edge into a windowed row, each
/// (source, target) pair at most once.
pub fn route_edges(frame: &ScheduleFrame) -> Vec<DrawInstruction> {
    let mut seen: FxHashSet<(&str, &str)> = FxHashSet::default();
    let mut arrows = Vec::new();

    for (target_idx, target) in frame.windowed_rows() {
        let Some(target_span) = bar_span(frame, target) else {
            continue;
        };
        for edge in frame.links.incoming(&target.id) {
            if !edge.resolved {
                continue;
            }
            let Some(source_idx) = frame.row_index(&edge.predecessor_id) else {
                continue;
            };
            let source = &frame.rows[source_idx];
            let Some(source_span) = bar_span(frame, source) else {
                continue;
            };
            if !seen.insert((source.id.as_str(), target.id.as_str())) {
                continue;
            }
            let points = route(
                frame,
                (source_idx, source_span),
                (target_idx, target_span),
                edge.relationship,
            );
            arrows.push(DrawInstruction::Arrow {
                source_id: source.id.clone(),
                target_id: target.id.clone(),
                points,
                relationship: edge.relationship,
                critical: source.is_critical && target.is_critical,
            });
        }
    }
    arrows
}

/// Orthogonal route between anchors.
///
/// The connector leaves the source away from its bar and enters the target
/// from the outside. When no single vertical segment satisfies both stubs
/// (typically a target that starts before the source ends), the route jogs
/// along the row boundary next to the source instead of cutting back
/// through the bars in between.
fn route(
    frame: &ScheduleFrame,
    (source_idx, source): (usize, BarSpan),
    (target_idx, target): (usize, BarSpan),
    relationship: Relationship,
) -> Vec<(f64, f64)> {
    let jog = frame.arrow_jog.max(0.0);
    let viewport = &frame.viewport;

    let (sx, out_dir) = if relationship.from_predecessor_start() {
        (source.start_x, -1.0)
    } else {
        (source.end_x, 1.0)
    };
    // +1 enters moving right (onto a start), -1 enters moving left.
    let (tx, in_dir) = if relationship.to_target_finish() {
        (target.end_x, -1.0)
    } else {
        (target.start_x, 1.0)
    };
    let sy = viewport.row_center(source_idx);
    let ty = viewport.row_center(target_idx);

    let exit_x = sx + out_dir * jog;
    let entry_x = tx - in_dir * jog;

    // Feasible x for a single vertical segment.
    let mut lower = f64::NEG_INFINITY;
    let mut upper = f64::INFINITY;
    if out_dir > 0.0 {
        lower = lower.max(exit_x);
    } else {
        upper = upper.min(exit_x);
    }
    if in_dir > 0.0 {
        upper = upper.min(entry_x);
    } else {
        lower = lower.max(entry_x);
    }

    if lower <= upper {
        let x = if lower.is_finite() { lower } else { upper };
        return vec![(sx, sy), (x, sy), (x, ty), (tx, ty)];
    }

    let toward = if ty >= sy { 1.0 } else { -1.0 };
    let boundary_y = sy + toward * viewport.row_height / 2.0;
    vec![
        (sx, sy),
        (exit_x, sy),
        (exit_x, boundary_y),
        (entry_x, boundary_y),
        (entry_x, ty),
        (tx, ty),
    ]
}
