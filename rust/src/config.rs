//! Configuration for the schedule engine and its render pipeline.

use pyo3::prelude::*;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("row height must be positive, got {0}")]
    RowHeight(f64),
    #[error("header height must not be negative, got {0}")]
    HeaderHeight(f64),
    #[error("zoom range is empty: min {min} > max {max} pixels per day")]
    ZoomRange { min: f64, max: f64 },
    #[error("minimum zoom must be positive, got {0}")]
    MinZoom(f64),
    #[error("percentile bounds must satisfy 0 <= low <= high <= 1, got {low}..{high}")]
    Percentiles { low: f64, high: f64 },
    #[error("range padding must not be negative, got {0} days")]
    Padding(i64),
}

/// Layout, zoom and scheduling knobs shared by one frame builder.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Fixed height of one grid/timeline row in pixels.
    #[pyo3(get, set)]
    pub row_height: f64,
    /// Height of the axis header above the first row.
    #[pyo3(get, set)]
    pub header_height: f64,
    /// Extra rows rendered beyond each edge of the visible window.
    #[pyo3(get, set)]
    pub overscan: usize,
    /// Pixels reserved left of the first day.
    #[pyo3(get, set)]
    pub left_margin: f64,
    /// Lower clamp for fit-to-view zoom.
    #[pyo3(get, set)]
    pub min_pixels_per_day: f64,
    /// Upper clamp for fit-to-view zoom.
    #[pyo3(get, set)]
    pub max_pixels_per_day: f64,
    /// Days added on each side of the percentile-trimmed date range.
    #[pyo3(get, set)]
    pub range_padding_days: i64,
    #[pyo3(get, set)]
    pub range_low_percentile: f64,
    #[pyo3(get, set)]
    pub range_high_percentile: f64,
    /// Horizontal stub length of dependency connectors.
    #[pyo3(get, set)]
    pub arrow_jog: f64,
    /// Schedule only rows without children (summary rows roll up instead).
    #[pyo3(get, set)]
    pub leaves_only: bool,
    /// Verbosity level: 0=silent, 1=summary, 2=detail, 3=trace.
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_height: 32.0,
            header_height: 48.0,
            overscan: 5,
            left_margin: 24.0,
            min_pixels_per_day: 0.5,
            max_pixels_per_day: 80.0,
            range_padding_days: 14,
            range_low_percentile: 0.01,
            range_high_percentile: 0.99,
            arrow_jog: 8.0,
            leaves_only: true,
            verbosity: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.row_height > 0.0) {
            return Err(ConfigError::RowHeight(self.row_height));
        }
        if !(self.header_height >= 0.0) {
            return Err(ConfigError::HeaderHeight(self.header_height));
        }
        if !(self.min_pixels_per_day > 0.0) {
            return Err(ConfigError::MinZoom(self.min_pixels_per_day));
        }
        if !(self.min_pixels_per_day <= self.max_pixels_per_day) {
            return Err(ConfigError::ZoomRange {
                min: self.min_pixels_per_day,
                max: self.max_pixels_per_day,
            });
        }
        let (low, high) = (self.range_low_percentile, self.range_high_percentile);
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(ConfigError::Percentiles { low, high });
        }
        if self.range_padding_days < 0 {
            return Err(ConfigError::Padding(self.range_padding_days));
        }
        Ok(())
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        row_height=None,
        header_height=None,
        overscan=None,
        left_margin=None,
        min_pixels_per_day=None,
        max_pixels_per_day=None,
        range_padding_days=None,
        range_low_percentile=None,
        range_high_percentile=None,
        arrow_jog=None,
        leaves_only=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        row_height: Option<f64>,
        header_height: Option<f64>,
        overscan: Option<usize>,
        left_margin: Option<f64>,
        min_pixels_per_day: Option<f64>,
        max_pixels_per_day: Option<f64>,
        range_padding_days: Option<i64>,
        range_low_percentile: Option<f64>,
        range_high_percentile: Option<f64>,
        arrow_jog: Option<f64>,
        leaves_only: Option<bool>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            row_height: row_height.unwrap_or(defaults.row_height),
            header_height: header_height.unwrap_or(defaults.header_height),
            overscan: overscan.unwrap_or(defaults.overscan),
            left_margin: left_margin.unwrap_or(defaults.left_margin),
            min_pixels_per_day: min_pixels_per_day.unwrap_or(defaults.min_pixels_per_day),
            max_pixels_per_day: max_pixels_per_day.unwrap_or(defaults.max_pixels_per_day),
            range_padding_days: range_padding_days.unwrap_or(defaults.range_padding_days),
            range_low_percentile: range_low_percentile.unwrap_or(defaults.range_low_percentile),
            range_high_percentile: range_high_percentile
                .unwrap_or(defaults.range_high_percentile),
            arrow_jog: arrow_jog.unwrap_or(defaults.arrow_jog),
            leaves_only: leaves_only.unwrap_or(defaults.leaves_only),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(row_height={}, overscan={}, zoom={}..{}, leaves_only={})",
            self.row_height,
            self.overscan,
            self.min_pixels_per_day,
            self.max_pixels_per_day,
            self.leaves_only
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_row_height() {
        let config = EngineConfig {
            row_height: 0.0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::RowHeight(0.0)));
    }

    #[test]
    fn test_rejects_inverted_zoom() {
        let config = EngineConfig {
            min_pixels_per_day: 10.0,
            max_pixels_per_day: 2.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZoomRange { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_percentiles() {
        let config = EngineConfig {
            range_low_percentile: 0.9,
            range_high_percentile: 0.1,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("0.9"));
    }

    #[test]
    fn test_rejects_nan_row_height() {
        let config = EngineConfig {
            row_height: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
