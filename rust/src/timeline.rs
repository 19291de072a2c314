//! Date to pixel mapping and axis ticks for the timeline surface.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::config::EngineConfig;
use crate::models::{FlatRow, MAX_SPAN_DAYS};

/// Tick granularity of the time axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimeScale {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl TimeScale {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Some(Self::Day),
            "week" | "weeks" => Some(Self::Week),
            "month" | "months" => Some(Self::Month),
            "quarter" | "quarters" => Some(Self::Quarter),
            "year" | "years" => Some(Self::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// First boundary on or after `date`.
    fn first_boundary(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => Some(date),
            Self::Week => {
                let offset = (7 - date.weekday().num_days_from_monday() as i64) % 7;
                date.checked_add_signed(Duration::days(offset))
            }
            Self::Month => month_start_on_or_after(date, 1),
            Self::Quarter => month_start_on_or_after(date, 3),
            Self::Year => month_start_on_or_after(date, 12),
        }
    }

    fn next_boundary(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => date.succ_opt(),
            Self::Week => date.checked_add_signed(Duration::days(7)),
            Self::Month => date.checked_add_months(Months::new(1)),
            Self::Quarter => date.checked_add_months(Months::new(3)),
            Self::Year => date.checked_add_months(Months::new(12)),
        }
    }

    fn label(&self, date: NaiveDate) -> String {
        match self {
            Self::Day => date.format("%d").to_string(),
            Self::Week => date.format("W%V").to_string(),
            Self::Month => date.format("%b %Y").to_string(),
            Self::Quarter => format!("Q{} {}", (date.month0() / 3) + 1, date.year()),
            Self::Year => date.format("%Y").to_string(),
        }
    }

    fn is_major(&self, date: NaiveDate) -> bool {
        match self {
            Self::Day => date.day() == 1,
            // Monday whose week contains the 1st of a month
            Self::Week => {
                date.day() == 1
                    || date
                        .checked_add_signed(Duration::days(6))
                        .is_some_and(|sunday| sunday.day() < date.day())
            }
            Self::Month => date.month() == 1,
            Self::Quarter => date.month() == 1,
            Self::Year => date.year().rem_euclid(5) == 0,
        }
    }
}

/// First day of a month on or after `date` whose zero-based month index is a
/// multiple of `step` (1 = any month, 3 = quarter starts, 12 = January).
fn month_start_on_or_after(date: NaiveDate, step: u32) -> Option<NaiveDate> {
    let mut candidate = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    if candidate < date {
        candidate = candidate.checked_add_months(Months::new(1))?;
    }
    let behind = (step - candidate.month0() % step) % step;
    candidate.checked_add_months(Months::new(behind))
}

/// Inclusive date range shown on the axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl VisibleRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Range covering the configured percentiles of all row dates, padded on
    /// both sides. Falls back to `today` when no row carries a date.
    pub fn from_rows(rows: &[FlatRow], config: &EngineConfig, today: NaiveDate) -> Self {
        let mut dates: Vec<NaiveDate> = rows
            .iter()
            .flat_map(|row| [row.start, row.end])
            .flatten()
            .collect();
        dates.sort_unstable();

        let (low, high) = if dates.is_empty() {
            (today, today)
        } else {
            (
                percentile(&dates, config.range_low_percentile),
                percentile(&dates, config.range_high_percentile),
            )
        };

        let padding = Duration::try_days(config.range_padding_days.clamp(0, MAX_SPAN_DAYS))
            .unwrap_or_else(Duration::zero);
        Self::new(
            low.checked_sub_signed(padding).unwrap_or(low),
            high.checked_add_signed(padding).unwrap_or(high),
        )
    }

    /// Day count, never below 1.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days().max(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Nearest-rank percentile over sorted, non-empty input.
fn percentile(sorted: &[NaiveDate], p: f64) -> NaiveDate {
    let last = sorted.len() - 1;
    let rank = ((last as f64) * p.clamp(0.0, 1.0)).round() as usize;
    sorted[rank.min(last)]
}

/// Zoom mode for the timeline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Zoom {
    /// Fit the visible range into the viewport width.
    #[default]
    Fit,
    /// Fixed pixels per day, still clamped to the configured range.
    Fixed(f64),
}

/// One axis tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub date: NaiveDate,
    pub x: f64,
    pub label: String,
    pub major: bool,
}

/// Linear map between calendar days and horizontal pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineMapper {
    pub range: VisibleRange,
    pub left_margin: f64,
    pub pixels_per_day: f64,
}

impl TimelineMapper {
    pub fn new(range: VisibleRange, left_margin: f64, pixels_per_day: f64) -> Self {
        Self {
            range,
            left_margin,
            pixels_per_day,
        }
    }

    /// Build a mapper for `zoom`, clamping the scale to the configured range.
    pub fn for_view(
        range: VisibleRange,
        zoom: Zoom,
        viewport_width: f64,
        config: &EngineConfig,
    ) -> Self {
        let raw = match zoom {
            Zoom::Fit => (viewport_width - config.left_margin) / range.days() as f64,
            Zoom::Fixed(pixels_per_day) => pixels_per_day,
        };
        let pixels_per_day = if raw.is_finite() {
            raw.clamp(config.min_pixels_per_day, config.max_pixels_per_day)
        } else {
            config.min_pixels_per_day
        };
        Self::new(range, config.left_margin, pixels_per_day)
    }

    pub fn fit_to_view(range: VisibleRange, viewport_width: f64, config: &EngineConfig) -> Self {
        Self::for_view(range, Zoom::Fit, viewport_width, config)
    }

    pub fn to_x(&self, date: NaiveDate) -> f64 {
        let days = (date - self.range.start).num_days();
        self.left_margin + days as f64 * self.pixels_per_day
    }

    /// Day under pixel `x`.
    pub fn to_date(&self, x: f64) -> NaiveDate {
        if !(self.pixels_per_day > 0.0) || !x.is_finite() {
            return self.range.start;
        }
        let days = ((x - self.left_margin) / self.pixels_per_day).floor() as i64;
        Duration::try_days(days)
            .and_then(|delta| self.range.start.checked_add_signed(delta))
            .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
    }

    /// Width of the scrollable canvas including the left margin.
    pub fn total_width(&self) -> f64 {
        self.to_x(self.range.end)
    }

    /// Ordered boundary ticks inside the visible range.
    pub fn ticks(&self, scale: TimeScale) -> Vec<Tick> {
        let mut ticks = Vec::new();
        let mut current = scale.first_boundary(self.range.start);
        while let Some(date) = current {
            if date > self.range.end {
                break;
            }
            ticks.push(Tick {
                date,
                x: self.to_x(date),
                label: scale.label(date),
                major: scale.is_major(date),
            });
            current = scale.next_boundary(date);
        }
        ticks
    }
}
