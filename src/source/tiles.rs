//! Image split into a grid of halo-padded tiles.

use super::WorkSource;
use crate::canvas::{Canvas, Rgba};
use crate::partition::{PartitionError, TileGrid};
use crate::protocol::WorkUnit;
use serde::{Deserialize, Serialize};

/// A square block of pixels plus its place in the grid.
///
/// As a work payload the block is halo-padded; backends return a block of the
/// same size, whose interior is written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
  /// Column in the tile grid.
  pub grid_x: u32,
  /// Row in the tile grid.
  pub grid_y: u32,
  /// Side of the block in pixels.
  pub edge: u32,
  /// Row-major pixels, `edge * edge` of them.
  pub pixels: Vec<Rgba>,
}

impl Tile {
  /// Pixel at `(x, y)` inside the block.
  pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
    if x >= self.edge || y >= self.edge {
      return None;
    }
    self.pixels.get((y * self.edge + x) as usize).copied()
  }

  /// Returns `true` if the pixel buffer matches `edge`.
  pub fn is_well_formed(&self) -> bool {
    self.pixels.len() == self.edge as usize * self.edge as usize
  }
}

/// Emits one padded tile per grid cell in row-major order.
///
/// Halo pixels that fall outside the image repeat the nearest border pixel.
#[derive(Debug, Clone)]
pub struct TileSource {
  canvas: Canvas,
  grid: TileGrid,
  next_id: u64,
}

impl TileSource {
  /// Creates a source over `canvas` laid out by `grid`.
  ///
  /// # Errors
  ///
  /// [`PartitionError::GridMismatch`] when the grid's interiors reach past the
  /// canvas, which includes any non-empty grid over an empty canvas.
  pub fn new(canvas: Canvas, grid: TileGrid) -> Result<Self, PartitionError> {
    let (grid_width, grid_height) = (
      grid.partition.covered_width(),
      grid.partition.covered_height(),
    );
    if grid_width > canvas.width() || grid_height > canvas.height() {
      return Err(PartitionError::GridMismatch {
        grid_width,
        grid_height,
        width: canvas.width(),
        height: canvas.height(),
      });
    }
    Ok(Self {
      canvas,
      grid,
      next_id: 0,
    })
  }

  /// The grid used to cut tiles.
  pub fn grid(&self) -> &TileGrid {
    &self.grid
  }

  /// Builds the padded tile for `id` without advancing the source.
  pub fn tile(&self, id: u64) -> Option<Tile> {
    let (grid_x, grid_y) = self.grid.grid_position(id)?;
    let (origin_x, origin_y) = self.grid.origin(id)?;
    let edge = self.grid.padded_edge();
    let leading = self.grid.leading() as i64;

    let mut pixels = Vec::with_capacity(edge as usize * edge as usize);
    for dy in 0..edge as i64 {
      for dx in 0..edge as i64 {
        let x = origin_x as i64 + dx - leading;
        let y = origin_y as i64 + dy - leading;
        pixels.push(self.canvas.get_clamped(x, y));
      }
    }

    Some(Tile {
      grid_x,
      grid_y,
      edge,
      pixels,
    })
  }
}

impl WorkSource for TileSource {
  type Payload = Tile;

  fn total(&self) -> usize {
    self.grid.tile_count()
  }

  fn next_unit(&mut self) -> Option<WorkUnit<Tile>> {
    let tile = self.tile(self.next_id)?;
    let unit = WorkUnit::new(self.next_id, tile);
    self.next_id += 1;
    Some(unit)
  }

  fn remaining(&self) -> usize {
    self.total() - self.next_id as usize
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(width: u32, height: u32) -> Canvas {
    Canvas::from_fn(width, height, |x, y| [x as u8, y as u8, 0, 255])
  }

  #[test]
  fn test_sixteen_square_makes_four_padded_tiles() {
    let grid = TileGrid::for_image(16, 16, 8, 2).unwrap();
    let mut source = TileSource::new(gradient(16, 16), grid).unwrap();
    assert_eq!(source.total(), 4);

    let units: Vec<_> = std::iter::from_fn(|| source.next_unit()).collect();
    assert_eq!(units.len(), 4);
    for (i, unit) in units.iter().enumerate() {
      assert_eq!(unit.id, i as u64);
      assert_eq!(unit.payload.edge, 10);
      assert_eq!(unit.payload.pixels.len(), 100);
      assert!(unit.payload.is_well_formed());
    }
    assert_eq!((units[1].payload.grid_x, units[1].payload.grid_y), (1, 0));
    assert_eq!((units[2].payload.grid_x, units[2].payload.grid_y), (0, 1));
  }

  #[test]
  fn test_halo_clamps_at_border() {
    let grid = TileGrid::for_image(16, 16, 8, 2).unwrap();
    let source = TileSource::new(gradient(16, 16), grid).unwrap();
    let tile = source.tile(0).unwrap();
    // Top-left halo repeats pixel (0, 0).
    assert_eq!(tile.get(0, 0), Some([0, 0, 0, 255]));
    // Interior starts one pixel in.
    assert_eq!(tile.get(1, 1), Some([0, 0, 0, 255]));
    assert_eq!(tile.get(2, 1), Some([1, 0, 0, 255]));
    // Right halo of tile 0 reads real pixels from tile 1.
    assert_eq!(tile.get(9, 1), Some([8, 0, 0, 255]));
  }

  #[test]
  fn test_halo_clamps_at_far_border() {
    let grid = TileGrid::for_image(16, 16, 8, 2).unwrap();
    let source = TileSource::new(gradient(16, 16), grid).unwrap();
    let tile = source.tile(3).unwrap();
    assert_eq!(tile.get(9, 9), Some([15, 15, 0, 255]));
    assert_eq!(tile.get(0, 0), Some([7, 7, 0, 255]));
  }

  #[test]
  fn test_tiles_are_deterministic() {
    let grid = TileGrid::for_image(24, 16, 8, 4).unwrap();
    let a = TileSource::new(gradient(24, 16), grid).unwrap();
    let b = TileSource::new(gradient(24, 16), grid).unwrap();
    for id in 0..6 {
      assert_eq!(a.tile(id), b.tile(id));
    }
    assert!(a.tile(6).is_none());
  }

  #[test]
  fn test_grid_larger_than_canvas_is_rejected() {
    let grid = TileGrid::for_image(32, 32, 8, 2).unwrap();
    let err = TileSource::new(gradient(16, 16), grid).unwrap_err();
    assert_eq!(
      err,
      PartitionError::GridMismatch {
        grid_width: 32,
        grid_height: 32,
        width: 16,
        height: 16,
      }
    );
    assert!(TileSource::new(Canvas::new(0, 0, [0; 4]), grid).is_err());
  }
}
