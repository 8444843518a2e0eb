//! Image partitioning into a grid of equal square tiles.
//!
//! When the greatest common divisor of the image dimensions is at most the
//! preferred edge, it is the tile edge and the grid covers the whole image.
//! Otherwise the tile edge is the largest common divisor between half the
//! preferred edge and the preferred edge itself. When no such divisor exists
//! the preferred edge (capped by the image) is used and the image is
//! truncated to a whole number of tiles; the truncated margin is left
//! untouched by write-back.

use serde::{Deserialize, Serialize};

/// Partitioning errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PartitionError {
  /// The image has no pixels.
  #[error("Cannot partition an empty {width}x{height} image")]
  EmptyImage {
    /// Image width.
    width: u32,
    /// Image height.
    height: u32,
  },
  /// A zero preferred edge.
  #[error("Preferred tile edge must be >= 1")]
  ZeroEdge,
  /// The grid covers more than the image it is applied to.
  #[error("Grid covers {grid_width}x{grid_height} but the image is {width}x{height}")]
  GridMismatch {
    /// Covered width.
    grid_width: u32,
    /// Covered height.
    grid_height: u32,
    /// Image width.
    width: u32,
    /// Image height.
    height: u32,
  },
}

/// Outcome of [`partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
  /// Side of every tile in pixels.
  pub tile_edge: u32,
  /// Tiles per row.
  pub grid_width: u32,
  /// Tiles per column.
  pub grid_height: u32,
}

impl Partition {
  /// Number of tiles.
  pub fn tile_count(&self) -> usize {
    self.grid_width as usize * self.grid_height as usize
  }

  /// Width of the image region covered by tiles.
  pub fn covered_width(&self) -> u32 {
    self.grid_width * self.tile_edge
  }

  /// Height of the image region covered by tiles.
  pub fn covered_height(&self) -> u32 {
    self.grid_height * self.tile_edge
  }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
  while b != 0 {
    (a, b) = (b, a % b);
  }
  a
}

/// Chooses a tile edge for a `width x height` image. Deterministic.
pub fn partition(
  width: u32,
  height: u32,
  preferred_edge: u32,
) -> Result<Partition, PartitionError> {
  if width == 0 || height == 0 {
    return Err(PartitionError::EmptyImage { width, height });
  }
  if preferred_edge == 0 {
    return Err(PartitionError::ZeroEdge);
  }

  let common = gcd(width, height);
  let tile_edge = if common <= preferred_edge {
    common
  } else {
    (preferred_edge.div_ceil(2)..=preferred_edge)
      .rev()
      .find(|edge| common % edge == 0)
      .unwrap_or_else(|| preferred_edge.min(width).min(height))
  };

  Ok(Partition {
    tile_edge,
    grid_width: width / tile_edge,
    grid_height: height / tile_edge,
  })
}

/// A partition plus the halo carried by every tile.
///
/// The halo is split across both sides of an axis: `leading = halo / 2`
/// pixels before the interior and the rest after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
  /// Tile layout.
  pub partition: Partition,
  /// Total extra pixels per axis.
  pub halo: u32,
}

impl TileGrid {
  /// Creates a grid.
  pub fn new(partition: Partition, halo: u32) -> Self {
    Self { partition, halo }
  }

  /// Partitions a `width x height` image and attaches `halo`.
  pub fn for_image(
    width: u32,
    height: u32,
    preferred_edge: u32,
    halo: u32,
  ) -> Result<Self, PartitionError> {
    Ok(Self::new(partition(width, height, preferred_edge)?, halo))
  }

  /// Number of tiles.
  pub fn tile_count(&self) -> usize {
    self.partition.tile_count()
  }

  /// Interior tile side.
  pub fn tile_edge(&self) -> u32 {
    self.partition.tile_edge
  }

  /// Halo pixels before the interior on each axis.
  pub fn leading(&self) -> u32 {
    self.halo / 2
  }

  /// Halo pixels after the interior on each axis.
  pub fn trailing(&self) -> u32 {
    self.halo - self.leading()
  }

  /// Side of a halo-padded tile.
  pub fn padded_edge(&self) -> u32 {
    self.partition.tile_edge + self.halo
  }

  /// Grid coordinates of tile `id` (row-major), or `None` past the last tile.
  pub fn grid_position(&self, id: u64) -> Option<(u32, u32)> {
    if id >= self.tile_count() as u64 {
      return None;
    }
    let grid_width = self.partition.grid_width as u64;
    Some(((id % grid_width) as u32, (id / grid_width) as u32))
  }

  /// Top-left pixel of tile `id`'s interior.
  pub fn origin(&self, id: u64) -> Option<(u32, u32)> {
    let edge = self.partition.tile_edge;
    self
      .grid_position(id)
      .map(|(gx, gy)| (gx * edge, gy * edge))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partition_exact_fit() {
    let p = partition(16, 16, 8).unwrap();
    assert_eq!(
      p,
      Partition {
        tile_edge: 8,
        grid_width: 2,
        grid_height: 2
      }
    );
    assert_eq!(p.tile_count(), 4);
  }

  #[test]
  fn test_partition_picks_largest_common_divisor() {
    let p = partition(1000, 600, 256).unwrap();
    assert_eq!(p.tile_edge, 200);
    assert_eq!((p.grid_width, p.grid_height), (5, 3));
  }

  #[test]
  fn test_partition_small_gcd_covers_whole_image() {
    let p = partition(100, 60, 256).unwrap();
    assert_eq!(p.tile_edge, 20);
    assert_eq!((p.grid_width, p.grid_height), (5, 3));
    assert_eq!((p.covered_width(), p.covered_height()), (100, 60));

    let coprime = partition(5, 3, 256).unwrap();
    assert_eq!(coprime.tile_edge, 1);
    assert_eq!(coprime.tile_count(), 15);
  }

  #[test]
  fn test_partition_truncates_when_no_divisor_fits() {
    // 1018 = 2 * 509: no divisor in [128, 256].
    let p = partition(1018, 1018, 256).unwrap();
    assert_eq!(p.tile_edge, 256);
    assert_eq!((p.grid_width, p.grid_height), (3, 3));
    assert_eq!(p.covered_width(), 768);
  }

  #[test]
  fn test_partition_errors() {
    assert_eq!(
      partition(0, 4, 2),
      Err(PartitionError::EmptyImage {
        width: 0,
        height: 4
      })
    );
    assert_eq!(partition(4, 4, 0), Err(PartitionError::ZeroEdge));
  }

  #[test]
  fn test_tile_grid_geometry() {
    let grid = TileGrid::for_image(16, 16, 8, 2).unwrap();
    assert_eq!(grid.padded_edge(), 10);
    assert_eq!((grid.leading(), grid.trailing()), (1, 1));
    assert_eq!(grid.origin(0), Some((0, 0)));
    assert_eq!(grid.origin(1), Some((8, 0)));
    assert_eq!(grid.origin(3), Some((8, 8)));
    assert_eq!(grid.origin(4), None);
  }

  #[test]
  fn test_odd_halo_puts_extra_pixel_after() {
    let grid = TileGrid::for_image(8, 8, 4, 3).unwrap();
    assert_eq!((grid.leading(), grid.trailing()), (1, 2));
    assert_eq!(grid.padded_edge(), 7);
  }
}
