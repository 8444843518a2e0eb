//! # WorkWeave
//!
//! Coordinator/worker distribution of divisible computations over
//! asynchronous point-to-point messaging.
//!
//! One coordinator hands out [`WorkUnit`](protocol::WorkUnit)s drawn from a
//! [`WorkSource`](source::WorkSource) to a fixed pool of workers, keeping up to
//! two units in flight per worker so that computation and communication
//! overlap. Results are merged by an [`Aggregator`](aggregator::Aggregator) in
//! whatever order they arrive, and the pool is shut down with a finish
//! sentinel once every result is in.
//!
//! Two job kinds ship with the crate:
//!
//! - numeric integration of `f(x)` over a range split into fixed steps,
//! - tiled image filtering with halo padding and spatial write-back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workweave::canvas::Canvas;
//! use workweave::config::{ClusterConfig, TileConfig};
//! use workweave::kernels::EdgePipeline;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let canvas = Canvas::load("input.png")?;
//! let tiles = TileConfig::default().with_halo(EdgePipeline::REQUIRED_HALO);
//! let report = workweave::jobs::detect_edges(
//!   canvas,
//!   &tiles,
//!   EdgePipeline::default(),
//!   &ClusterConfig::default(),
//! )
//! .await?;
//! report.into_output().save("edges.png")?;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Result merging strategies.
pub mod aggregator;
/// RGBA pixel buffers and image file IO.
pub mod canvas;
/// In-process pool harness.
pub mod cluster;
/// The compute backend trait.
pub mod compute;
/// Run configuration.
pub mod config;
/// One-call job entry points.
pub mod jobs;
/// Built-in compute backends.
pub mod kernels;
/// Image partitioning into square tiles.
pub mod partition;
/// Frames, tags and message encoding.
pub mod protocol;
/// The coordinator.
pub mod scheduler;
/// Work unit producers.
pub mod source;
/// Log subscriber setup.
pub mod telemetry;
/// Ranks and worker ids.
pub mod topology;
/// Point-to-point messaging.
pub mod transport;
/// The worker loop.
pub mod worker;
