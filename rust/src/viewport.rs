//! Row virtualization: which slice of the flattened rows gets drawn.
//!
//! Coordinates are canvas coordinates: row 0 starts directly under the
//! header, and the surface applies the scroll offset when painting.

use std::ops::RangeInclusive;

use crate::config::EngineConfig;

/// Inclusive range of row indices to draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub end: usize,
}

impl RowWindow {
    pub fn row_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Row window plus the geometry needed to place rows on the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// `None` when there are no rows.
    pub window: Option<RowWindow>,
    pub total_rows: usize,
    pub row_height: f64,
    pub header_height: f64,
    pub scroll_offset: f64,
    pub viewport_height: f64,
}

impl Viewport {
    /// Visible window for the current scroll position, widened by the
    /// configured overscan on both sides.
    pub fn compute(
        total_rows: usize,
        scroll_offset: f64,
        viewport_height: f64,
        config: &EngineConfig,
    ) -> Self {
        let scroll_offset = non_negative(scroll_offset);
        let viewport_height = non_negative(viewport_height);
        Self {
            window: compute_window(
                total_rows,
                scroll_offset,
                viewport_height,
                config.row_height,
                config.overscan,
            ),
            total_rows,
            row_height: config.row_height,
            header_height: config.header_height,
            scroll_offset,
            viewport_height,
        }
    }

    pub fn row_top(&self, index: usize) -> f64 {
        self.header_height + index as f64 * self.row_height
    }

    pub fn row_center(&self, index: usize) -> f64 {
        self.row_top(index) + self.row_height / 2.0
    }

    /// Height of the full scrollable content including the header.
    pub fn content_height(&self) -> f64 {
        self.row_top(self.total_rows)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// `start = max(0, floor(offset / h) - overscan)`,
/// `end = min(total - 1, start + ceil(height / h) + 2 * overscan)`.
///
/// Offsets past the last row pin the window to the final row.
pub fn compute_window(
    total_rows: usize,
    scroll_offset: f64,
    viewport_height: f64,
    row_height: f64,
    overscan: usize,
) -> Option<RowWindow> {
    if total_rows == 0 || !(row_height > 0.0) {
        return None;
    }
    let last = total_rows - 1;
    let first_visible = (non_negative(scroll_offset) / row_height).floor() as usize;
    let start = first_visible.saturating_sub(overscan).min(last);
    let visible = (non_negative(viewport_height) / row_height).ceil() as usize;
    let end = start
        .saturating_add(visible)
        .saturating_add(overscan.saturating_mul(2))
        .min(last);
    Some(RowWindow { start, end })
}
