//! One-call entry points for the two built-in job kinds.

use crate::aggregator::{CanvasAggregator, SumAggregator};
use crate::canvas::Canvas;
use crate::cluster::{ClusterError, ClusterReport, LocalCluster};
use crate::compute::Compute;
use crate::config::{ClusterConfig, RangeConfig, TileConfig};
use crate::kernels::Midpoint;
use crate::partition::TileGrid;
use crate::source::{RangeSource, Tile, TileSource};
use tracing::{info, warn};

/// Integrates `f` over `range` with one midpoint sample per step.
///
/// ```rust
/// use workweave::config::{ClusterConfig, RangeConfig};
///
/// # tokio_test::block_on(async {
/// let report = workweave::jobs::integrate(
///   |x| x,
///   RangeConfig::new(0.0, 4.0, 1.0),
///   &ClusterConfig::default().with_workers(2),
/// )
/// .await?;
/// assert_eq!(*report.output(), 8.0);
/// # Ok::<(), workweave::cluster::ClusterError>(())
/// # }).unwrap();
/// ```
pub async fn integrate<F>(
  f: F,
  range: RangeConfig,
  config: &ClusterConfig,
) -> Result<ClusterReport<f64>, ClusterError>
where
  F: Fn(f64) -> f64 + Send + Sync + 'static,
{
  info!(lo = range.lo, hi = range.hi, step = range.step, "Integrating");
  let source = RangeSource::new(range)?;
  let cluster = LocalCluster::new(config.clone())?;
  cluster
    .run(source, Midpoint::new(f), SumAggregator::new())
    .await
}

/// Tiles `canvas`, runs `kernel` over every tile and writes the interiors back.
///
/// Pixels outside the tiled area (when the partition truncates) and the
/// regions of failed tiles keep their input values.
pub async fn detect_edges<K>(
  canvas: Canvas,
  tiles: &TileConfig,
  kernel: K,
  config: &ClusterConfig,
) -> Result<ClusterReport<Canvas>, ClusterError>
where
  K: Compute<Input = Tile, Output = Tile>,
{
  tiles.validate()?;
  let grid = TileGrid::for_image(
    canvas.width(),
    canvas.height(),
    tiles.preferred_edge,
    tiles.halo,
  )?;
  let cluster = LocalCluster::new(config.clone())?;
  info!(
    width = canvas.width(),
    height = canvas.height(),
    tile_edge = grid.tile_edge(),
    tiles = grid.tile_count(),
    "Detecting edges"
  );

  let source = TileSource::new(canvas.clone(), grid)?;
  let aggregator = CanvasAggregator::new(canvas, grid);
  let report = cluster.run(source, kernel, aggregator).await?;
  if report.run.stats.failed > 0 {
    warn!(failed = report.run.stats.failed, "Some tiles kept their input pixels");
  }
  Ok(report)
}
