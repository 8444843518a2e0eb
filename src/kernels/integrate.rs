//! Midpoint-rule integration of a function over one interval.

use crate::compute::{Compute, ComputeError};
use crate::source::Interval;

/// Integrates `f` over each interval with the midpoint rule.
///
/// Each interval is cut into `subdivisions` equal slices; the area of a slice
/// is its width times `f` at its midpoint. Non-finite results fail the unit.
pub struct Midpoint<F> {
  function: F,
  subdivisions: u32,
}

impl<F> Midpoint<F>
where
  F: Fn(f64) -> f64 + Send + Sync + 'static,
{
  /// One slice per interval.
  pub fn new(function: F) -> Self {
    Self {
      function,
      subdivisions: 1,
    }
  }

  /// Sets the number of slices per interval (at least 1).
  #[must_use]
  pub fn with_subdivisions(mut self, subdivisions: u32) -> Self {
    self.subdivisions = subdivisions.max(1);
    self
  }

  /// Area under `f` over `interval`.
  pub fn area(&self, interval: Interval) -> f64 {
    let slice = interval.width() / self.subdivisions as f64;
    (0..self.subdivisions)
      .map(|i| {
        let mid = interval.lo + (i as f64 + 0.5) * slice;
        (self.function)(mid) * slice
      })
      .sum()
  }
}

impl<F> Compute for Midpoint<F>
where
  F: Fn(f64) -> f64 + Send + Sync + 'static,
{
  type Input = Interval;
  type Output = f64;

  fn compute(&self, interval: Interval) -> Result<f64, ComputeError> {
    let area = self.area(interval);
    if area.is_finite() {
      Ok(area)
    } else {
      Err(ComputeError::Failed(format!(
        "non-finite area over [{}, {})",
        interval.lo, interval.hi
      )))
    }
  }
}
