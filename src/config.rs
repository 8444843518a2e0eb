//! Run configuration.
//!
//! Every config struct has sensible defaults, `with_*` builder methods and a
//! `validate` method. All of them (de)serialize with serde, so a run can be
//! described in JSON:
//!
//! ```rust
//! use workweave::config::{ClusterConfig, DispatchMode};
//!
//! let json = r#"{ "worker_count": 8, "dispatch_mode": "wave_barrier" }"#;
//! let config = ClusterConfig::from_json(json)?;
//! assert_eq!(config.worker_count, 8);
//! assert_eq!(config.dispatch_mode, DispatchMode::WaveBarrier);
//! # Ok::<(), workweave::config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
  /// The pool has no workers.
  #[error("worker_count must be >= 1")]
  NoWorkers,
  /// Channels need room for at least one frame.
  #[error("channel_capacity must be >= 1")]
  ZeroCapacity,
  /// Tiles must be at least one pixel wide.
  #[error("preferred_edge must be >= 1")]
  ZeroTileEdge,
  /// The numeric range is unusable.
  #[error("Invalid range: {0}")]
  InvalidRange(String),
  /// The JSON document could not be parsed.
  #[error("Invalid config document: {0}")]
  Parse(String),
}

/// How the coordinator feeds workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
  /// Two units in flight per worker, refilled as soon as any result lands.
  #[default]
  Pipelined,
  /// One unit per worker per wave; the next wave starts once the whole wave
  /// has returned.
  WaveBarrier,
}

/// Pool and scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
  /// Number of worker processes (the coordinator is extra).
  pub worker_count: usize,
  /// Frames buffered per link direction.
  pub channel_capacity: usize,
  /// Scheduling strategy.
  pub dispatch_mode: DispatchMode,
  /// Upper bound of the random delay added to each send, in microseconds.
  /// Zero disables jitter.
  pub send_jitter_micros: u64,
}

impl Default for ClusterConfig {
  fn default() -> Self {
    Self {
      worker_count: 4,
      channel_capacity: 1,
      dispatch_mode: DispatchMode::Pipelined,
      send_jitter_micros: 0,
    }
  }
}

impl ClusterConfig {
  /// Parses a JSON document; missing fields take their defaults.
  pub fn from_json(document: &str) -> Result<Self, ConfigError> {
    let config: Self =
      serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Sets the number of workers.
  #[must_use]
  pub fn with_workers(mut self, worker_count: usize) -> Self {
    self.worker_count = worker_count;
    self
  }

  /// Sets the per-direction channel capacity.
  #[must_use]
  pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
    self.channel_capacity = capacity;
    self
  }

  /// Sets the dispatch mode.
  #[must_use]
  pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
    self.dispatch_mode = mode;
    self
  }

  /// Sets the maximum send jitter.
  #[must_use]
  pub fn with_send_jitter(mut self, jitter: Duration) -> Self {
    self.send_jitter_micros = jitter.as_micros() as u64;
    self
  }

  /// Maximum send jitter as a duration.
  pub fn send_jitter(&self) -> Duration {
    Duration::from_micros(self.send_jitter_micros)
  }

  /// Checks the configuration.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.worker_count == 0 {
      return Err(ConfigError::NoWorkers);
    }
    if self.channel_capacity == 0 {
      return Err(ConfigError::ZeroCapacity);
    }
    Ok(())
  }
}

/// Image tiling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
  /// Largest acceptable tile edge in pixels.
  pub preferred_edge: u32,
  /// Extra pixels added around each tile, summed over both sides of an axis.
  pub halo: u32,
}

impl Default for TileConfig {
  fn default() -> Self {
    Self {
      preferred_edge: 256,
      halo: 2,
    }
  }
}

impl TileConfig {
  /// Sets the preferred tile edge.
  #[must_use]
  pub fn with_preferred_edge(mut self, edge: u32) -> Self {
    self.preferred_edge = edge;
    self
  }

  /// Sets the halo.
  #[must_use]
  pub fn with_halo(mut self, halo: u32) -> Self {
    self.halo = halo;
    self
  }

  /// Checks the configuration.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.preferred_edge == 0 {
      return Err(ConfigError::ZeroTileEdge);
    }
    Ok(())
  }
}

/// Numeric interval split into fixed-size sub-ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
  /// Inclusive lower bound.
  pub lo: f64,
  /// Exclusive upper bound.
  pub hi: f64,
  /// Width of each sub-range.
  pub step: f64,
}

impl RangeConfig {
  /// Creates a range config.
  pub fn new(lo: f64, hi: f64, step: f64) -> Self {
    Self { lo, hi, step }
  }

  /// Checks the configuration.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.lo.is_finite() || !self.hi.is_finite() {
      return Err(ConfigError::InvalidRange(format!(
        "bounds must be finite, got [{}, {})",
        self.lo, self.hi
      )));
    }
    if !self.step.is_finite() || self.step <= 0.0 {
      return Err(ConfigError::InvalidRange(format!(
        "step must be positive, got {}",
        self.step
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cluster_config_default() {
    let config = ClusterConfig::default();
    assert_eq!(config.worker_count, 4);
    assert_eq!(config.channel_capacity, 1);
    assert_eq!(config.dispatch_mode, DispatchMode::Pipelined);
    assert_eq!(config.send_jitter(), Duration::ZERO);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_cluster_config_builders() {
    let config = ClusterConfig::default()
      .with_workers(2)
      .with_channel_capacity(3)
      .with_dispatch_mode(DispatchMode::WaveBarrier)
      .with_send_jitter(Duration::from_micros(50));
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.channel_capacity, 3);
    assert_eq!(config.dispatch_mode, DispatchMode::WaveBarrier);
    assert_eq!(config.send_jitter_micros, 50);
  }

  #[test]
  fn test_cluster_config_rejects_empty_pool() {
    assert_eq!(
      ClusterConfig::default().with_workers(0).validate(),
      Err(ConfigError::NoWorkers)
    );
    assert_eq!(
      ClusterConfig::default().with_channel_capacity(0).validate(),
      Err(ConfigError::ZeroCapacity)
    );
  }

  #[test]
  fn test_cluster_config_from_json() {
    let config = ClusterConfig::from_json(r#"{"worker_count": 3}"#).unwrap();
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.channel_capacity, 1);

    let err = ClusterConfig::from_json(r#"{"worker_count": 0}"#).unwrap_err();
    assert_eq!(err, ConfigError::NoWorkers);
    assert!(matches!(
      ClusterConfig::from_json("not json"),
      Err(ConfigError::Parse(_))
    ));
  }

  #[test]
  fn test_tile_config() {
    let config = TileConfig::default();
    assert_eq!(config.preferred_edge, 256);
    assert_eq!(config.halo, 2);
    assert_eq!(
      config.with_preferred_edge(0).validate(),
      Err(ConfigError::ZeroTileEdge)
    );
  }

  #[test]
  fn test_range_config_validation() {
    assert!(RangeConfig::new(0.0, 4.0, 1.0).validate().is_ok());
    assert!(RangeConfig::new(0.0, 4.0, 0.0).validate().is_err());
    assert!(RangeConfig::new(0.0, 4.0, f64::NAN).validate().is_err());
    assert!(RangeConfig::new(f64::NEG_INFINITY, 4.0, 1.0).validate().is_err());
  }
}
