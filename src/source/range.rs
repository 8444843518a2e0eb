//! Numeric interval split into consecutive half-open sub-ranges.

use super::WorkSource;
use crate::config::{ConfigError, RangeConfig};
use crate::protocol::WorkUnit;
use serde::{Deserialize, Serialize};

/// Half-open interval `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
  /// Inclusive lower bound.
  pub lo: f64,
  /// Exclusive upper bound.
  pub hi: f64,
}

impl Interval {
  /// Creates an interval.
  pub fn new(lo: f64, hi: f64) -> Self {
    Self { lo, hi }
  }

  /// `hi - lo`.
  pub fn width(&self) -> f64 {
    self.hi - self.lo
  }
}

/// Splits `[lo, hi)` into steps of fixed width; the last one is clipped to `hi`.
#[derive(Debug, Clone)]
pub struct RangeSource {
  config: RangeConfig,
  total: usize,
  next_index: usize,
}

impl RangeSource {
  /// Creates a source from a validated range.
  pub fn new(config: RangeConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let total = Self::count(&config);
    Ok(Self {
      config,
      total,
      next_index: 0,
    })
  }

  fn count(config: &RangeConfig) -> usize {
    if config.lo >= config.hi {
      return 0;
    }
    let mut total = ((config.hi - config.lo) / config.step).ceil() as usize;
    // Rounding can add a trailing empty step.
    while total > 0 && config.lo + (total - 1) as f64 * config.step >= config.hi {
      total -= 1;
    }
    total
  }

  /// The interval of unit `index`.
  pub fn interval(&self, index: usize) -> Option<Interval> {
    if index >= self.total {
      return None;
    }
    let lo = self.config.lo + index as f64 * self.config.step;
    let hi = (lo + self.config.step).min(self.config.hi);
    Some(Interval::new(lo, hi))
  }
}

impl WorkSource for RangeSource {
  type Payload = Interval;

  fn total(&self) -> usize {
    self.total
  }

  fn next_unit(&mut self) -> Option<WorkUnit<Interval>> {
    let interval = self.interval(self.next_index)?;
    let unit = WorkUnit::new(self.next_index as u64, interval);
    self.next_index += 1;
    Some(unit)
  }

  fn remaining(&self) -> usize {
    self.total - self.next_index
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drain(source: &mut RangeSource) -> Vec<Interval> {
    std::iter::from_fn(|| source.next_unit())
      .map(|u| u.payload)
      .collect()
  }

  #[test]
  fn test_unit_steps() {
    let mut source = RangeSource::new(RangeConfig::new(0.0, 4.0, 1.0)).unwrap();
    assert_eq!(source.total(), 4);
    let intervals = drain(&mut source);
    assert_eq!(intervals[0], Interval::new(0.0, 1.0));
    assert_eq!(intervals[3], Interval::new(3.0, 4.0));
  }

  #[test]
  fn test_last_step_is_clipped() {
    let mut source = RangeSource::new(RangeConfig::new(0.0, 2.5, 1.0)).unwrap();
    assert_eq!(source.total(), 3);
    let intervals = drain(&mut source);
    assert_eq!(intervals[2], Interval::new(2.0, 2.5));
  }

  #[test]
  fn test_rounding_does_not_add_empty_step() {
    let source = RangeSource::new(RangeConfig::new(0.0, 1.0, 0.1)).unwrap();
    assert_eq!(source.total(), 10);
    let last = source.interval(9).unwrap();
    assert!(last.width() > 0.0);
    assert_eq!(last.hi, 1.0);
  }

  #[test]
  fn test_empty_range() {
    let mut source = RangeSource::new(RangeConfig::new(3.0, 3.0, 1.0)).unwrap();
    assert_eq!(source.total(), 0);
    assert!(source.next_unit().is_none());
  }

  #[test]
  fn test_invalid_step() {
    assert!(RangeSource::new(RangeConfig::new(0.0, 1.0, -1.0)).is_err());
  }

  #[test]
  fn test_ids_follow_position() {
    let mut source = RangeSource::new(RangeConfig::new(-1.0, 1.0, 0.5)).unwrap();
    let first = source.next_unit().unwrap();
    let second = source.next_unit().unwrap();
    assert_eq!((first.id, second.id), (0, 1));
    assert_eq!(source.remaining(), 2);
  }
}
