//! An in-process pool: one coordinator task plus `worker_count` worker tasks
//! wired by [`LocalTransport`].

use crate::aggregator::Aggregator;
use crate::compute::Compute;
use crate::config::{ClusterConfig, ConfigError};
use crate::partition::PartitionError;
use crate::scheduler::{Coordinator, RunReport, SchedulerError};
use crate::source::WorkSource;
use crate::topology::{Topology, TopologyError, WorkerId};
use crate::transport::LocalTransport;
use crate::worker::{Worker, WorkerError, WorkerReport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{error, info};

/// Errors from setting up or running a pool.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
  /// Invalid configuration.
  #[error("Configuration error: {0}")]
  Config(#[from] ConfigError),

  /// The pool layout is unusable.
  #[error("Topology error: {0}")]
  Topology(#[from] TopologyError),

  /// The image cannot be tiled.
  #[error("Partition error: {0}")]
  Partition(#[from] PartitionError),

  /// The coordinator aborted the run.
  #[error("Coordinator error: {0}")]
  Scheduler(#[from] SchedulerError),

  /// A worker stopped with an error.
  #[error("{worker} failed: {source}")]
  Worker {
    /// Worker that failed.
    worker: WorkerId,
    /// Its error.
    source: WorkerError,
  },

  /// A worker task panicked or was cancelled.
  #[error("Worker task failed: {0}")]
  Join(String),
}

/// Coordinator report plus one report per worker, in rank order.
#[derive(Debug, Clone)]
pub struct ClusterReport<O> {
  /// What the coordinator saw.
  pub run: RunReport<O>,
  /// What each worker did.
  pub workers: Vec<WorkerReport>,
}

impl<O> ClusterReport<O> {
  /// The aggregated output.
  pub fn output(&self) -> &O {
    &self.run.output
  }

  /// Consumes the report, keeping only the output.
  pub fn into_output(self) -> O {
    self.run.output
  }
}

/// Runs jobs on a pool of tokio tasks.
#[derive(Debug, Clone)]
pub struct LocalCluster {
  config: ClusterConfig,
}

impl LocalCluster {
  /// Creates a cluster after validating `config`.
  pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
    config.validate()?;
    Ok(Self { config })
  }

  /// The cluster's configuration.
  pub fn config(&self) -> &ClusterConfig {
    &self.config
  }

  /// Runs one job: spawns the workers, drives the coordinator to completion
  /// and joins every worker.
  ///
  /// # Errors
  ///
  /// A coordinator error takes precedence; otherwise the first worker error
  /// in rank order is returned.
  pub async fn run<S, C, A>(
    &self,
    source: S,
    compute: C,
    aggregator: A,
  ) -> Result<ClusterReport<A::Output>, ClusterError>
  where
    S: WorkSource,
    S::Payload: Serialize + DeserializeOwned + Send,
    C: Compute<Input = S::Payload, Output = A::Result>,
    C::Input: DeserializeOwned,
    C::Output: Serialize + DeserializeOwned,
    A: Aggregator,
    A::Result: Serialize + DeserializeOwned + Send,
  {
    let topology = Topology::with_workers(self.config.worker_count)?;
    let (endpoint, worker_endpoints) = LocalTransport::new(topology)
      .with_capacity(self.config.channel_capacity)
      .with_jitter(self.config.send_jitter())
      .build();
    info!(
      workers = topology.worker_count(),
      capacity = self.config.channel_capacity,
      "Starting local cluster"
    );

    let compute = Arc::new(compute);
    let handles: Vec<_> = worker_endpoints
      .into_iter()
      .map(|endpoint| {
        let id = endpoint.id;
        let mut worker = Worker::new(endpoint, Arc::clone(&compute));
        (id, tokio::spawn(async move { worker.serve().await }))
      })
      .collect();

    let run = match Coordinator::new(endpoint, self.config.dispatch_mode) {
      Ok(coordinator) => coordinator.run(source, aggregator).await,
      Err(e) => Err(e),
    };
    let run = match run {
      Ok(run) => run,
      Err(e) => {
        error!(error = %e, "Run aborted");
        for (_, handle) in &handles {
          handle.abort();
        }
        return Err(e.into());
      }
    };

    let mut workers = Vec::with_capacity(handles.len());
    for (worker, handle) in handles {
      let report = handle
        .await
        .map_err(|e| ClusterError::Join(e.to_string()))?
        .map_err(|source| ClusterError::Worker { worker, source })?;
      workers.push(report);
    }
    Ok(ClusterReport { run, workers })
  }
}
