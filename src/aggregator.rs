//! Merging result units into the final output.
//!
//! Both strategies are commutative: results may arrive in any order and the
//! final output is the same (up to floating-point reassociation for sums).
//! A failed unit never corrupts the merge; it is counted and skipped.

use crate::canvas::Canvas;
use crate::partition::TileGrid;
use crate::protocol::{ResultUnit, UnitOutcome};
use crate::source::Tile;
use tracing::warn;

/// Folds result units into an output.
pub trait Aggregator {
  /// Result payload consumed.
  type Result;
  /// Final output.
  type Output;

  /// Merges one result.
  fn merge(&mut self, unit: ResultUnit<Self::Result>);

  /// Number of merged units that failed or could not be applied.
  fn failed(&self) -> usize;

  /// Consumes the aggregator, yielding the output.
  fn finish(self) -> Self::Output;
}

/// Scalar accumulation: the output is the sum of every completed result.
#[derive(Debug, Clone, Default)]
pub struct SumAggregator {
  sum: f64,
  merged: usize,
  failed: usize,
}

impl SumAggregator {
  /// Starts from zero.
  pub fn new() -> Self {
    Self::default()
  }

  /// Running total.
  pub fn sum(&self) -> f64 {
    self.sum
  }

  /// Number of results added to the sum.
  pub fn merged(&self) -> usize {
    self.merged
  }
}

impl Aggregator for SumAggregator {
  type Result = f64;
  type Output = f64;

  fn merge(&mut self, unit: ResultUnit<f64>) {
    match unit.outcome {
      UnitOutcome::Completed(value) => {
        self.sum += value;
        self.merged += 1;
      }
      UnitOutcome::Failed(reason) => {
        warn!(unit = unit.id, reason = %reason, "Skipping failed unit");
        self.failed += 1;
      }
    }
  }

  fn failed(&self) -> usize {
    self.failed
  }

  fn finish(self) -> f64 {
    self.sum
  }
}

/// Spatial write-back: copies each tile's interior into the canvas.
///
/// The canvas starts as the source image, so regions of failed tiles (and any
/// margin left over by truncation) keep their original pixels.
#[derive(Debug, Clone)]
pub struct CanvasAggregator {
  canvas: Canvas,
  grid: TileGrid,
  failed: usize,
}

impl CanvasAggregator {
  /// Writes into `canvas`, locating tiles with `grid`.
  pub fn new(canvas: Canvas, grid: TileGrid) -> Self {
    Self {
      canvas,
      grid,
      failed: 0,
    }
  }

  /// Current state of the output.
  pub fn canvas(&self) -> &Canvas {
    &self.canvas
  }

  fn write_back(&mut self, id: u64, tile: &Tile) -> Result<(), String> {
    let (origin_x, origin_y) = self
      .grid
      .origin(id)
      .ok_or_else(|| format!("tile id {} is outside the grid", id))?;
    if tile.edge != self.grid.padded_edge() || !tile.is_well_formed() {
      return Err(format!(
        "tile edge {} does not match padded edge {}",
        tile.edge,
        self.grid.padded_edge()
      ));
    }

    let leading = self.grid.leading();
    let interior = self.grid.tile_edge();
    for dy in 0..interior {
      for dx in 0..interior {
        if let Some(pixel) = tile.get(dx + leading, dy + leading) {
          self.canvas.set(origin_x + dx, origin_y + dy, pixel);
        }
      }
    }
    Ok(())
  }
}

impl Aggregator for CanvasAggregator {
  type Result = Tile;
  type Output = Canvas;

  fn merge(&mut self, unit: ResultUnit<Tile>) {
    let id = unit.id;
    let applied = match unit.outcome {
      UnitOutcome::Completed(tile) => self.write_back(id, &tile),
      UnitOutcome::Failed(reason) => Err(reason),
    };
    if let Err(reason) = applied {
      warn!(unit = id, reason = %reason, "Leaving tile region unmodified");
      self.failed += 1;
    }
  }

  fn failed(&self) -> usize {
    self.failed
  }

  fn finish(self) -> Canvas {
    self.canvas
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{TileSource, WorkSource};

  #[test]
  fn test_sum_skips_failed_units() {
    let mut sum = SumAggregator::new();
    sum.merge(ResultUnit::completed(0, 1.5));
    sum.merge(ResultUnit::failed(1, "boom"));
    sum.merge(ResultUnit::completed(2, 2.5));
    assert_eq!(sum.merged(), 2);
    assert_eq!(sum.failed(), 1);
    assert_eq!(sum.finish(), 4.0);
  }

  #[test]
  fn test_empty_sum_is_zero() {
    assert_eq!(SumAggregator::new().finish(), 0.0);
  }

  fn source_16() -> (Canvas, TileGrid, TileSource) {
    let canvas = Canvas::from_fn(16, 16, |x, y| [x as u8, y as u8, (x * y) as u8, 255]);
    let grid = TileGrid::for_image(16, 16, 8, 2).unwrap();
    (canvas.clone(), grid, TileSource::new(canvas, grid).unwrap())
  }

  #[test]
  fn test_identity_write_back_reconstructs_canvas() {
    let (original, grid, mut source) = source_16();
    let blank = Canvas::new(16, 16, [0; 4]);
    let mut aggregator = CanvasAggregator::new(blank, grid);
    while let Some(unit) = source.next_unit() {
      aggregator.merge(ResultUnit::completed(unit.id, unit.payload));
    }
    assert_eq!(aggregator.failed(), 0);
    assert_eq!(aggregator.finish(), original);
  }

  #[test]
  fn test_write_back_is_idempotent() {
    let (_, grid, source) = source_16();
    let blank = Canvas::new(16, 16, [0; 4]);
    let tile = source.tile(2).unwrap();

    let mut once = CanvasAggregator::new(blank.clone(), grid);
    once.merge(ResultUnit::completed(2, tile.clone()));
    let mut twice = CanvasAggregator::new(blank, grid);
    twice.merge(ResultUnit::completed(2, tile.clone()));
    twice.merge(ResultUnit::completed(2, tile));
    assert_eq!(once.finish(), twice.finish());
  }

  #[test]
  fn test_failed_tile_leaves_region_unmodified() {
    let (original, grid, source) = source_16();
    let mut aggregator = CanvasAggregator::new(original.clone(), grid);
    aggregator.merge(ResultUnit::failed(1, "kernel error"));
    assert_eq!(aggregator.failed(), 1);

    let mut wrong = source.tile(0).unwrap();
    wrong.edge = 4;
    aggregator.merge(ResultUnit::completed(0, wrong));
    aggregator.merge(ResultUnit::completed(99, source.tile(3).unwrap()));
    assert_eq!(aggregator.failed(), 3);
    assert_eq!(aggregator.finish(), original);
  }
}
