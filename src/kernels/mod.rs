//! Ready-made compute backends.
//!
//! - [`Midpoint`]: numeric integration over [`Interval`](crate::source::Interval) units.
//! - [`Identity`], [`Sobel`], [`EdgePipeline`]: tile stencils over
//!   [`Tile`](crate::source::Tile) units.

pub mod edges;
pub mod integrate;

pub use edges::{EdgePipeline, Identity, Sobel};
pub use integrate::Midpoint;
