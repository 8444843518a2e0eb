//! Process topology: one coordinator at rank 0, workers at ranks `1..N`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a process in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
  /// The coordinating process.
  pub const COORDINATOR: Rank = Rank(0);

  /// Returns `true` for rank 0.
  pub fn is_coordinator(self) -> bool {
    self == Self::COORDINATOR
  }
}

impl fmt::Display for Rank {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "rank-{}", self.0)
  }
}

/// Identifier of a worker process. Always a non-zero rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u32);

impl WorkerId {
  /// Creates a worker id from a rank, rejecting the coordinator's rank.
  pub fn from_rank(rank: Rank) -> Option<Self> {
    (!rank.is_coordinator()).then_some(Self(rank.0))
  }

  /// Worker id for the zero-based worker index `index` (rank `index + 1`).
  pub fn from_index(index: usize) -> Self {
    Self(index as u32 + 1)
  }

  /// Rank of this worker.
  pub fn rank(self) -> Rank {
    Rank(self.0)
  }

  /// Zero-based position among workers.
  pub fn index(self) -> usize {
    (self.0 - 1) as usize
  }
}

impl fmt::Display for WorkerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "worker-{}", self.0)
  }
}

/// Errors describing an unusable topology.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
  /// Fewer than two processes: nobody to hand work to.
  #[error("Topology needs at least 2 processes, got {0}")]
  TooFewProcesses(u32),
  /// More workers than ranks can address.
  #[error("Topology cannot address {0} workers")]
  TooManyWorkers(usize),
}

/// Fixed layout of a pool: rank 0 coordinates, every other rank works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
  process_count: u32,
}

impl Topology {
  /// Creates a topology of `process_count` processes (coordinator included).
  pub fn new(process_count: u32) -> Result<Self, TopologyError> {
    if process_count < 2 {
      return Err(TopologyError::TooFewProcesses(process_count));
    }
    Ok(Self { process_count })
  }

  /// Creates a topology with `worker_count` workers plus the coordinator.
  pub fn with_workers(worker_count: usize) -> Result<Self, TopologyError> {
    let process_count = u32::try_from(worker_count)
      .ok()
      .and_then(|n| n.checked_add(1))
      .ok_or(TopologyError::TooManyWorkers(worker_count))?;
    Self::new(process_count)
  }

  /// Total number of processes.
  pub fn process_count(&self) -> u32 {
    self.process_count
  }

  /// Number of worker processes.
  pub fn worker_count(&self) -> usize {
    (self.process_count - 1) as usize
  }

  /// Worker ids in rank order.
  pub fn workers(&self) -> impl Iterator<Item = WorkerId> {
    (1..self.process_count).map(WorkerId)
  }
}
