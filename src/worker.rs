//! The worker loop.
//!
//! A worker blocks for its first message, then for every work unit it:
//!
//! 1. posts a receive for the next message (the coordinator's prefetch),
//! 2. computes the unit on the blocking pool,
//! 3. waits for its previous result send to complete,
//! 4. posts the send of the new result,
//! 5. waits for the prefetched message.
//!
//! It stops on the finish sentinel once its last result send has completed.
//! Step 3 happens before step 5: the coordinator sends the finish sentinel
//! only after every result has arrived, so waiting on the prefetch first
//! would hold back the final result forever.

use crate::compute::Compute;
use crate::protocol::{Frame, ProtocolError, ResultUnit, WorkMessage, WorkUnit};
use crate::topology::{Rank, WorkerId};
use crate::transport::{RecvPort, SendHandle, SendPort, TransportError, WorkerEndpoint};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Waiting for the first message.
  AwaitInitial,
  /// Processing units.
  Computing,
  /// Finish sentinel received and outstanding sends drained.
  Finished,
}

/// Errors that stop a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  /// The link to the coordinator failed.
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),

  /// A message from the coordinator could not be decoded.
  #[error("Protocol error: {0}")]
  Protocol(#[from] ProtocolError),
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
  /// Which worker.
  pub worker: WorkerId,
  /// Units processed, failed ones included.
  pub computed: usize,
  /// Units whose compute failed or panicked.
  pub failed: usize,
  /// State the worker stopped in.
  pub state: WorkerState,
}

/// One worker bound to its endpoint and compute backend.
pub struct Worker<C> {
  id: WorkerId,
  send: SendPort,
  recv: Option<RecvPort>,
  compute: Arc<C>,
  state: WorkerState,
}

impl<C> Worker<C>
where
  C: Compute,
  C::Input: DeserializeOwned,
  C::Output: Serialize + DeserializeOwned,
{
  /// Binds `compute` to `endpoint`.
  pub fn new(endpoint: WorkerEndpoint, compute: Arc<C>) -> Self {
    Self {
      id: endpoint.id,
      send: endpoint.send,
      recv: Some(endpoint.recv),
      compute,
      state: WorkerState::AwaitInitial,
    }
  }

  /// This worker's id.
  pub fn id(&self) -> WorkerId {
    self.id
  }

  /// Current lifecycle state.
  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Serves units until the finish sentinel arrives.
  ///
  /// # Errors
  ///
  /// Transport failures and undecodable messages stop the worker. Compute
  /// failures do not; they are reported to the coordinator as failed units.
  /// A worker whose previous `serve` failed cannot serve again.
  pub async fn serve(&mut self) -> Result<WorkerReport, WorkerError> {
    let mut port = self.recv.take().ok_or(TransportError::Disconnected {
      peer: Rank::COORDINATOR,
    })?;
    let mut computed = 0;
    let mut failed = 0;
    let mut pending: Option<SendHandle> = None;
    let mut message = Self::decode(&port.recv().await?)?;

    while let WorkMessage::Work(unit) = message {
      self.state = WorkerState::Computing;
      let prefetch = port.irecv();

      let result = Self::run_unit(self.id, &self.compute, unit).await;
      let (frame, ok) = Self::encode(self.id, &result)?;
      computed += 1;
      if !ok {
        failed += 1;
      }

      if let Some(previous) = pending.take() {
        previous.await?;
      }
      pending = Some(self.send.isend(frame));

      let (next, returned) = prefetch.await?;
      port = returned;
      message = Self::decode(&next)?;
    }

    if let Some(previous) = pending.take() {
      previous.await?;
    }
    self.recv = Some(port);
    self.state = WorkerState::Finished;
    debug!(worker = %self.id, computed, failed, "Worker finished");

    Ok(WorkerReport {
      worker: self.id,
      computed,
      failed,
      state: self.state,
    })
  }

  fn decode(frame: &Frame) -> Result<WorkMessage<C::Input>, ProtocolError> {
    WorkMessage::decode(frame)
  }

  /// Encodes `result`, replacing it with a failed unit when its payload does
  /// not survive the wire (JSON writes non-finite floats as `null`).
  ///
  /// Returns the frame and whether it carries a completed outcome.
  fn encode(
    worker: WorkerId,
    result: &ResultUnit<C::Output>,
  ) -> Result<(Frame, bool), WorkerError> {
    let checked = result
      .encode()
      .and_then(|frame| ResultUnit::<C::Output>::decode(&frame).map(|_| frame));
    match checked {
      Ok(frame) => Ok((frame, !result.outcome.is_failed())),
      Err(e) => {
        warn!(worker = %worker, unit = result.id, error = %e, "Result not representable");
        let reason = format!("result not representable: {e}");
        let frame = ResultUnit::<C::Output>::failed(result.id, reason).encode()?;
        Ok((frame, false))
      }
    }
  }

  async fn run_unit(
    worker: WorkerId,
    compute: &Arc<C>,
    unit: WorkUnit<C::Input>,
  ) -> ResultUnit<C::Output> {
    let WorkUnit { id, payload } = unit;
    trace!(worker = %worker, unit = id, "Computing unit");
    let compute = Arc::clone(compute);
    match tokio::task::spawn_blocking(move || compute.compute(payload)).await {
      Ok(Ok(output)) => ResultUnit::completed(id, output),
      Ok(Err(e)) => {
        warn!(worker = %worker, unit = id, error = %e, "Unit failed");
        ResultUnit::failed(id, e.to_string())
      }
      Err(e) => {
        warn!(worker = %worker, unit = id, error = %e, "Compute task panicked");
        ResultUnit::failed(id, format!("compute panicked: {}", e))
      }
    }
  }
}
