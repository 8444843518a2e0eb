//! RGBA pixel canvas plus conversion to and from image files.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One pixel: red, green, blue, alpha.
pub type Rgba = [u8; 4];

/// Canvas errors.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
  /// Pixel buffer does not match the declared dimensions.
  #[error("Pixel buffer holds {actual} pixels, expected {expected}")]
  SizeMismatch {
    /// `width * height`.
    expected: usize,
    /// Length of the supplied buffer.
    actual: usize,
  },
  /// Decoding or encoding failed.
  #[error("Image error: {0}")]
  Image(#[from] image::ImageError),
}

/// A row-major RGBA image held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
  width: u32,
  height: u32,
  pixels: Vec<Rgba>,
}

impl Canvas {
  /// Creates a canvas filled with `fill`.
  pub fn new(width: u32, height: u32, fill: Rgba) -> Self {
    Self {
      width,
      height,
      pixels: vec![fill; width as usize * height as usize],
    }
  }

  /// Wraps an existing pixel buffer.
  pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self, CanvasError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
      return Err(CanvasError::SizeMismatch {
        expected,
        actual: pixels.len(),
      });
    }
    Ok(Self {
      width,
      height,
      pixels,
    })
  }

  /// Builds a canvas whose pixels are `f(x, y)`.
  pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Rgba) -> Self {
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
      for x in 0..width {
        pixels.push(f(x, y));
      }
    }
    Self {
      width,
      height,
      pixels,
    }
  }

  /// Width in pixels.
  pub fn width(&self) -> u32 {
    self.width
  }

  /// Height in pixels.
  pub fn height(&self) -> u32 {
    self.height
  }

  /// Row-major pixel buffer.
  pub fn pixels(&self) -> &[Rgba] {
    &self.pixels
  }

  /// Pixel at `(x, y)`, or `None` outside the canvas.
  pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
    (x < self.width && y < self.height).then(|| self.pixels[self.offset(x, y)])
  }

  /// Pixel at `(x, y)` with coordinates clamped to the nearest edge.
  ///
  /// An empty canvas has no edge to clamp to and yields a transparent pixel.
  pub fn get_clamped(&self, x: i64, y: i64) -> Rgba {
    if self.width == 0 || self.height == 0 {
      return [0; 4];
    }
    let cx = x.clamp(0, self.width as i64 - 1) as u32;
    let cy = y.clamp(0, self.height as i64 - 1) as u32;
    self.pixels[self.offset(cx, cy)]
  }

  /// Overwrites the pixel at `(x, y)`. Writes outside the canvas are ignored.
  pub fn set(&mut self, x: u32, y: u32, pixel: Rgba) {
    if x < self.width && y < self.height {
      let offset = self.offset(x, y);
      self.pixels[offset] = pixel;
    }
  }

  fn offset(&self, x: u32, y: u32) -> usize {
    y as usize * self.width as usize + x as usize
  }

  /// Converts an `image` buffer.
  pub fn from_rgba_image(image: &image::RgbaImage) -> Self {
    Self {
      width: image.width(),
      height: image.height(),
      pixels: image.pixels().map(|p| p.0).collect(),
    }
  }

  /// Converts into an `image` buffer.
  pub fn to_rgba_image(&self) -> image::RgbaImage {
    image::RgbaImage::from_fn(self.width, self.height, |x, y| {
      image::Rgba(self.pixels[self.offset(x, y)])
    })
  }

  /// Loads any format the `image` crate can decode.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, CanvasError> {
    let image = image::open(path)?.to_rgba8();
    Ok(Self::from_rgba_image(&image))
  }

  /// Saves the canvas; the format follows the file extension.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CanvasError> {
    self.to_rgba_image().save(path)?;
    Ok(())
  }
}
