//! Stencil kernels over halo-padded tiles.
//!
//! All kernels return a tile of the same size as their input. Pixels whose
//! stencil would reach past the tile sample the nearest tile pixel, so results
//! are only exact where the halo is wide enough: one pixel per side for
//! [`Sobel`], three for [`EdgePipeline`].

use crate::canvas::Rgba;
use crate::compute::{Compute, ComputeError};
use crate::source::Tile;

const SOBEL_X: [[i32; 3]; 3] = [[1, 2, 1], [0, 0, 0], [-1, -2, -1]];
const SOBEL_Y: [[i32; 3]; 3] = [[1, 0, -1], [2, 0, -2], [1, 0, -1]];
const GAUSSIAN: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

fn check(tile: &Tile) -> Result<(), ComputeError> {
  if tile.is_well_formed() {
    Ok(())
  } else {
    Err(ComputeError::InvalidInput(format!(
      "tile ({}, {}) holds {} pixels for edge {}",
      tile.grid_x,
      tile.grid_y,
      tile.pixels.len(),
      tile.edge
    )))
  }
}

/// Returns the tile unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Compute for Identity {
  type Input = Tile;
  type Output = Tile;

  fn compute(&self, tile: Tile) -> Result<Tile, ComputeError> {
    check(&tile)?;
    Ok(tile)
  }
}

/// Per-channel Sobel gradient magnitude, halved to fit a byte.
///
/// The outermost ring of the tile is copied through; alpha is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sobel;

impl Sobel {
  fn filter(tile: &Tile) -> Vec<Rgba> {
    let edge = tile.edge as usize;
    let at = |x: usize, y: usize| tile.pixels[y * edge + x];
    let mut out = tile.pixels.clone();
    if edge < 3 {
      return out;
    }

    for y in 1..edge - 1 {
      for x in 1..edge - 1 {
        let mut pixel = at(x, y);
        for channel in 0..3 {
          let mut gx = 0;
          let mut gy = 0;
          for (ky, row) in SOBEL_X.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
              let sample = at(x + kx - 1, y + ky - 1)[channel] as i32;
              gx += weight * sample;
              gy += SOBEL_Y[ky][kx] * sample;
            }
          }
          let magnitude = ((gx * gx + gy * gy) as f32).sqrt() / 2.0;
          pixel[channel] = magnitude as u8;
        }
        out[y * edge + x] = pixel;
      }
    }
    out
  }
}

impl Compute for Sobel {
  type Input = Tile;
  type Output = Tile;

  fn compute(&self, tile: Tile) -> Result<Tile, ComputeError> {
    check(&tile)?;
    let pixels = Self::filter(&tile);
    Ok(Tile { pixels, ..tile })
  }
}

/// Square single-channel working buffer.
struct Plane {
  edge: usize,
  values: Vec<f32>,
}

impl Plane {
  fn get(&self, x: isize, y: isize) -> f32 {
    let last = self.edge as isize - 1;
    let cx = x.clamp(0, last) as usize;
    let cy = y.clamp(0, last) as usize;
    self.values[cy * self.edge + cx]
  }

  fn map(&self, mut f: impl FnMut(isize, isize) -> f32) -> Plane {
    let mut values = Vec::with_capacity(self.values.len());
    for y in 0..self.edge as isize {
      for x in 0..self.edge as isize {
        values.push(f(x, y));
      }
    }
    Plane {
      edge: self.edge,
      values,
    }
  }
}

/// Greyscale, Gaussian blur, Sobel gradient, non-maximum suppression, threshold.
///
/// Emits black pixels with white edges, fully opaque.
#[derive(Debug, Clone, Copy)]
pub struct EdgePipeline {
  threshold: f32,
}

impl Default for EdgePipeline {
  fn default() -> Self {
    Self { threshold: 40.0 }
  }
}

impl EdgePipeline {
  /// Halo needed for exact results at tile seams.
  pub const REQUIRED_HALO: u32 = 6;

  /// Creates a pipeline keeping gradients of at least `threshold`.
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }

  fn greyscale(tile: &Tile) -> Plane {
    Plane {
      edge: tile.edge as usize,
      values: tile
        .pixels
        .iter()
        .map(|[r, g, b, _]| 0.299 * *r as f32 + 0.587 * *g as f32 + 0.114 * *b as f32)
        .collect(),
    }
  }

  fn blur(plane: &Plane) -> Plane {
    plane.map(|x, y| {
      let mut sum = 0.0;
      for (dy, row) in GAUSSIAN.iter().enumerate() {
        for (dx, weight) in row.iter().enumerate() {
          sum += weight * plane.get(x + dx as isize - 1, y + dy as isize - 1);
        }
      }
      sum / 16.0
    })
  }

  fn gradient(plane: &Plane) -> (Plane, Plane) {
    // SOBEL_Y differentiates along x, SOBEL_X along y (both negated).
    let dx = plane.map(|x, y| Self::convolve(plane, &SOBEL_Y, x, y));
    let dy = plane.map(|x, y| Self::convolve(plane, &SOBEL_X, x, y));
    let magnitude = dx.map(|x, y| dx.get(x, y).hypot(dy.get(x, y)));
    let direction = dx.map(|x, y| dy.get(x, y).atan2(dx.get(x, y)));
    (magnitude, direction)
  }

  fn convolve(plane: &Plane, kernel: &[[i32; 3]; 3], x: isize, y: isize) -> f32 {
    let mut sum = 0.0;
    for (ky, row) in kernel.iter().enumerate() {
      for (kx, weight) in row.iter().enumerate() {
        sum += *weight as f32 * plane.get(x + kx as isize - 1, y + ky as isize - 1);
      }
    }
    sum
  }

  fn suppress(magnitude: &Plane, direction: &Plane) -> Plane {
    magnitude.map(|x, y| {
      let value = magnitude.get(x, y);
      let angle = direction.get(x, y).to_degrees().rem_euclid(180.0);
      let (dx, dy) = if !(22.5..157.5).contains(&angle) {
        (1, 0)
      } else if angle < 67.5 {
        (1, 1)
      } else if angle < 112.5 {
        (0, 1)
      } else {
        (-1, 1)
      };
      let before = magnitude.get(x - dx, y - dy);
      let after = magnitude.get(x + dx, y + dy);
      if value >= before && value >= after {
        value
      } else {
        0.0
      }
    })
  }
}

impl Compute for EdgePipeline {
  type Input = Tile;
  type Output = Tile;

  fn compute(&self, tile: Tile) -> Result<Tile, ComputeError> {
    check(&tile)?;
    let grey = Self::greyscale(&tile);
    let blurred = Self::blur(&grey);
    let (magnitude, direction) = Self::gradient(&blurred);
    let thin = Self::suppress(&magnitude, &direction);
    let pixels = thin
      .values
      .iter()
      .map(|&v| {
        let level = if v >= self.threshold { 255 } else { 0 };
        [level, level, level, 255]
      })
      .collect();
    Ok(Tile { pixels, ..tile })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tile_from(edge: u32, f: impl Fn(u32, u32) -> Rgba) -> Tile {
    let mut pixels = Vec::new();
    for y in 0..edge {
      for x in 0..edge {
        pixels.push(f(x, y));
      }
    }
    Tile {
      grid_x: 0,
      grid_y: 0,
      edge,
      pixels,
    }
  }

  fn step(edge: u32) -> Tile {
    tile_from(edge, |x, _| if x < edge / 2 { [0, 0, 0, 255] } else { [200, 200, 200, 255] })
  }

  #[test]
  fn test_identity_rejects_malformed_tile() {
    let mut tile = step(4);
    tile.pixels.pop();
    assert!(matches!(
      Identity.compute(tile),
      Err(ComputeError::InvalidInput(_))
    ));
  }

  #[test]
  fn test_sobel_flat_tile_is_black_inside() {
    let tile = tile_from(6, |_, _| [90, 90, 90, 128]);
    let out = Sobel.compute(tile).unwrap();
    assert_eq!(out.get(2, 2), Some([0, 0, 0, 128]));
    // Border ring is copied through.
    assert_eq!(out.get(0, 0), Some([90, 90, 90, 128]));
  }

  #[test]
  fn test_sobel_detects_vertical_step() {
    let out = Sobel.compute(step(8)).unwrap();
    // Across the step: |gy| = 4 * 200, magnitude / 2 saturates.
    assert_eq!(out.get(4, 3).map(|p| p[0]), Some(255));
    assert_eq!(out.get(1, 3).map(|p| p[0]), Some(0));
    assert_eq!(out.get(6, 3).map(|p| p[0]), Some(0));
  }

  #[test]
  fn test_edge_pipeline_flat_tile_has_no_edges() {
    let tile = tile_from(10, |_, _| [10, 200, 30, 255]);
    let out = EdgePipeline::default().compute(tile).unwrap();
    assert!(out.pixels.iter().all(|p| *p == [0, 0, 0, 255]));
  }

  #[test]
  fn test_edge_pipeline_marks_step_column() {
    let out = EdgePipeline::default().compute(step(12)).unwrap();
    let row: Vec<u8> = (0..12).map(|x| out.get(x, 6).unwrap()[0]).collect();
    assert!(row.iter().any(|&v| v == 255));
    assert_eq!(row[0], 0);
    assert_eq!(row[11], 0);
    assert!(out.pixels.iter().all(|p| p[0] == 0 || p[0] == 255));
  }
}
