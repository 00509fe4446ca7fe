//! Parameter metadata for the analysis configuration
//!
//! This module describes every numeric knob of [`AnalysisConfig`], enabling:
//! - Grid search over swing and trend line settings
//! - Strict validation of externally supplied values
//! - Clamping of out-of-range values to the nearest valid one
//!
//! # Example
//!
//! ```rust
//! use chartswing::params::{ParamType, ANALYSIS_PARAMS};
//!
//! for param in ANALYSIS_PARAMS {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! let offset = ANALYSIS_PARAMS.iter().find(|p| p.name == "trendline_offset").unwrap();
//! assert_eq!(offset.param_type, ParamType::Count);
//! assert_eq!(offset.generate_grid(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
//! ```
//!
//! [`AnalysisConfig`]: crate::AnalysisConfig

use crate::{ChartError, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Non-negative integer count (candles, swing points, lines)
  Count,
  /// Non-negative integer pixel distance
  Pixels,
  /// One of a fixed list of values
  Choice,
}

/// Metadata for a single configuration parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, matching the `AnalysisConfig` field
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Accepted values: (min, max). Wider than `range` for open-ended counts.
  pub bounds: (f64, f64),
  /// Accepted values of a [`ParamType::Choice`] parameter
  pub choices: Option<&'static [f64]>,
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Count parameter
  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    let bounds = (range.0, range.1);
    Self { name, param_type: ParamType::Count, default, range, bounds, choices: None, description }
  }

  /// Create a new ParamMeta for a Pixels parameter
  pub const fn pixels(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    let bounds = (range.0, range.1);
    Self { name, param_type: ParamType::Pixels, default, range, bounds, choices: None, description }
  }

  /// Create a new ParamMeta for a Choice parameter; the range spans the choices
  pub const fn choice(
    name: &'static str,
    default: f64,
    choices: &'static [f64],
    description: &'static str,
  ) -> Self {
    let range = (choices[0], choices[choices.len() - 1], 0.0);
    let bounds = (range.0, range.1);
    Self { name, param_type: ParamType::Choice, default, range, bounds, choices: Some(choices), description }
  }

  /// Accept any value above the minimum; the grid keeps `range`
  pub const fn unbounded(mut self) -> Self {
    self.bounds.1 = f64::INFINITY;
    self
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    if let Some(choices) = self.choices {
      return choices.to_vec();
    }
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(ChartError::InvalidValue("parameter must be finite"));
    }
    let (min, max) = self.bounds;
    if value < min || value > max {
      return Err(ChartError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Count | ParamType::Pixels => {
        if value.fract() != 0.0 {
          return Err(ChartError::InvalidValue("parameter must be a whole number"));
        }
        Ok(())
      },
      ParamType::Choice => {
        let allowed = self.choices.unwrap_or_default();
        if !allowed.contains(&value) {
          return Err(ChartError::InvalidValue("parameter must be one of its choices"));
        }
        Ok(())
      },
    }
  }

  /// Nearest valid value; NaN falls back to the default.
  ///
  /// Choices snap to the closest entry, ties going to the smaller one.
  pub fn clamp(&self, value: f64) -> f64 {
    if value.is_nan() {
      return self.default;
    }
    let (min, max) = self.bounds;
    match self.choices {
      Some(choices) => choices
        .iter()
        .copied()
        .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
        .unwrap_or(self.default),
      None => value.round().clamp(min, max),
    }
  }
}

// ============================================================
// ANALYSIS PARAMETERS
// ============================================================

/// Accepted vertical distance thresholds in pixels
pub const DISTANCE_CHOICES: &[f64] = &[0.0, 10.0, 20.0, 50.0, 100.0, 200.0];

/// Metadata of every numeric `AnalysisConfig` field
pub const ANALYSIS_PARAMS: &[ParamMeta] = &[
  ParamMeta::count(
    "left_required",
    2.0,
    (0.0, 20.0, 1.0),
    "Shallower candidates required to the left of a parent swing point",
  )
  .unbounded(),
  ParamMeta::count(
    "right_required",
    2.0,
    (0.0, 20.0, 1.0),
    "Shallower candidates required to the right of a parent swing point",
  )
  .unbounded(),
  ParamMeta::count(
    "trendline_offset",
    1.0,
    (1.0, 5.0, 1.0),
    "Candles past the partner swing point where the line ends",
  ),
  ParamMeta::choice(
    "distance_threshold",
    0.0,
    DISTANCE_CHOICES,
    "Minimum vertical pixel span between sender and receiver",
  ),
  ParamMeta::count(
    "max_trendlines",
    10.0,
    (0.0, 100.0, 1.0),
    "Lines kept per chart, newest senders first; 0 labels swing points only",
  )
  .unbounded(),
  ParamMeta::pixels(
    "crossing_tolerance",
    20.0,
    (0.0, 200.0, 5.0),
    "Vertical distance within which a swing point counts as crossing a line",
  ),
  ParamMeta::pixels(
    "stoploss_box_height",
    40.0,
    (0.0, 500.0, 10.0),
    "Stoploss distance beyond the order parent",
  ),
  ParamMeta::count(
    "expiry_swing_count",
    3.0,
    (1.0, 20.0, 1.0),
    "Same-kind swing points after the partner that expire a pending order",
  ),
];

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{AnalysisConfig, DistanceThreshold};

  fn meta(name: &str) -> &'static ParamMeta {
    ANALYSIS_PARAMS.iter().find(|p| p.name == name).unwrap()
  }

  #[test]
  fn test_defaults_match_config() {
    let config = AnalysisConfig::default();
    for param in ANALYSIS_PARAMS {
      assert_eq!(config.numeric(param.name), Some(param.default), "{}", param.name);
      assert!(param.validate(param.default).is_ok(), "{}", param.name);
    }
  }

  #[test]
  fn test_distance_choices_match_threshold() {
    let choices: Vec<f64> = DistanceThreshold::CHOICES.iter().map(|&c| c as f64).collect();
    assert_eq!(DISTANCE_CHOICES, choices.as_slice());
    assert_eq!(meta("distance_threshold").range, (0.0, 200.0, 0.0));
  }

  #[test]
  fn test_generate_grid() {
    let grid = meta("crossing_tolerance").generate_grid();
    assert_eq!(grid.len(), 41);
    assert_eq!(grid[0], 0.0);
    assert_eq!(grid[40], 200.0);

    assert_eq!(meta("distance_threshold").generate_grid(), DISTANCE_CHOICES.to_vec());
  }

  #[test]
  fn test_validate_count() {
    let offset = meta("trendline_offset");
    assert!(offset.validate(1.0).is_ok());
    assert!(offset.validate(5.0).is_ok());
    assert!(matches!(offset.validate(0.0), Err(ChartError::OutOfRange { .. })));
    assert!(matches!(offset.validate(6.0), Err(ChartError::OutOfRange { .. })));
    assert!(matches!(offset.validate(2.5), Err(ChartError::InvalidValue(_))));
    assert!(offset.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_validate_choice() {
    let distance = meta("distance_threshold");
    assert!(distance.validate(50.0).is_ok());
    assert!(matches!(distance.validate(30.0), Err(ChartError::InvalidValue(_))));
    assert!(matches!(distance.validate(250.0), Err(ChartError::OutOfRange { .. })));
  }

  #[test]
  fn test_open_ended_counts() {
    for name in ["left_required", "right_required", "max_trendlines"] {
      let param = meta(name);
      assert!(param.validate(25.0).is_ok(), "{name}");
      assert!(param.validate(10_000.0).is_ok(), "{name}");
      assert!(matches!(param.validate(-1.0), Err(ChartError::OutOfRange { .. })), "{name}");
      assert_eq!(param.clamp(150.0), 150.0);
      assert_eq!(param.clamp(-4.0), 0.0);
    }
    assert_eq!(meta("left_required").generate_grid().len(), 21);
    assert!(meta("trendline_offset").validate(6.0).is_err());
  }

  #[test]
  fn test_clamp() {
    assert_eq!(meta("trendline_offset").clamp(9.0), 5.0);
    assert_eq!(meta("trendline_offset").clamp(-3.0), 1.0);
    assert_eq!(meta("expiry_swing_count").clamp(0.0), 1.0);
    assert_eq!(meta("left_required").clamp(2.4), 2.0);
    assert_eq!(meta("left_required").clamp(f64::NAN), 2.0);

    let distance = meta("distance_threshold");
    assert_eq!(distance.clamp(14.0), 10.0);
    assert_eq!(distance.clamp(15.0), 10.0);
    assert_eq!(distance.clamp(35.0), 20.0);
    assert_eq!(distance.clamp(1000.0), 200.0);
  }
}
