//! The coordinator: dispatches work units, collects results, shuts the pool down.
//!
//! ## Pipelined dispatch
//!
//! Each worker holds up to two units: one it is computing and one queued
//! behind it.
//!
//! 1. **Warm-up**: every worker gets its first unit with a blocking send.
//! 2. **Prefetch**: for every busy worker, a receive is posted for its result
//!    and a second unit is sent without waiting.
//! 3. **Completion loop**: whichever receive completes first is merged. The
//!    coordinator then waits for that worker's outstanding send (its frame must
//!    not be reused before then), sends the next unit if any remain, and
//!    re-posts the receive while the worker still holds a unit.
//! 4. **Drain**: once the source is exhausted the loop keeps collecting until
//!    every dispatched unit has come back, then any outstanding sends are
//!    awaited.
//! 5. **Shutdown**: every worker receives the finish sentinel.
//!
//! ## Wave-barrier dispatch
//!
//! One unit per worker per wave; the next wave starts only when every result
//! of the current wave has been merged.

pub mod slot;

pub use slot::{RequestSlot, SlotPeaks};

use crate::aggregator::Aggregator;
use crate::config::DispatchMode;
use crate::protocol::{Frame, ProtocolError, ResultUnit, WorkMessage, WorkUnit};
use crate::source::WorkSource;
use crate::topology::WorkerId;
use crate::transport::{CoordinatorEndpoint, RecvPort, RecvSet, TransportError, wait_all};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Kind of transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  /// A send.
  Send,
  /// A receive.
  Receive,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operation::Send => write!(f, "send"),
      Operation::Receive => write!(f, "receive"),
    }
  }
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
  /// A send, receive or wait failed.
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),

  /// A frame could not be encoded or decoded.
  #[error("Protocol error with {worker}: {source}")]
  Protocol {
    /// Worker at the other end.
    worker: WorkerId,
    /// Underlying protocol error.
    source: ProtocolError,
  },

  /// Bookkeeping could not be allocated.
  #[error("Could not allocate bookkeeping for {0} entries")]
  Resources(usize),

  /// The coordinator has nobody to send work to.
  #[error("Worker pool is empty")]
  NoWorkers,

  /// An operation was posted while the previous one was still outstanding.
  #[error("A {operation} is already pending for {worker}")]
  SlotBusy {
    /// Worker whose slot is occupied.
    worker: WorkerId,
    /// Operation that was attempted.
    operation: Operation,
  },

  /// A result arrived for a unit that was never dispatched or already collected.
  #[error("Result for unknown unit {unit} from {worker}")]
  UnknownUnit {
    /// Sender of the result.
    worker: WorkerId,
    /// Offending unit id.
    unit: u64,
  },

  /// No receive is outstanding but results are still missing.
  #[error("Run stalled with {completed} of {total} results collected")]
  Stalled {
    /// Results collected.
    completed: usize,
    /// Units in the source.
    total: usize,
  },
}

/// When a unit was handed to its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// First unit per worker, blocking send.
  WarmUp,
  /// Second unit per worker, sent right after warm-up.
  Prefetch,
  /// Sent after one of the worker's results came back.
  Refill,
  /// Sent as part of a wave in wave-barrier mode.
  Wave,
}

/// One dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
  /// Unit sent.
  pub unit_id: u64,
  /// Destination worker.
  pub worker: WorkerId,
  /// Dispatch phase.
  pub phase: Phase,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
  /// Units in the source.
  pub total: usize,
  /// Units sent to workers.
  pub dispatched: usize,
  /// Results collected.
  pub completed: usize,
  /// Results the aggregator could not use.
  pub failed: usize,
  /// Finish sentinels sent.
  pub finish_sent: usize,
}

/// Outcome of [`Coordinator::run`].
#[derive(Debug, Clone)]
pub struct RunReport<O> {
  /// Aggregated output.
  pub output: O,
  /// Counters.
  pub stats: RunStats,
  /// Dispatch decisions in the order they were made.
  pub assignments: Vec<Assignment>,
  /// Peak concurrency per worker, in rank order.
  pub slot_peaks: Vec<SlotPeaks>,
}

/// Dispatch and collection bookkeeping for one run.
struct Ledger {
  total: usize,
  dispatched: usize,
  completed: usize,
  outstanding: HashMap<u64, WorkerId>,
  assignments: Vec<Assignment>,
}

impl Ledger {
  fn new(total: usize, workers: usize) -> Result<Self, SchedulerError> {
    let mut assignments = Vec::new();
    assignments
      .try_reserve_exact(total)
      .map_err(|_| SchedulerError::Resources(total))?;
    let mut outstanding = HashMap::new();
    outstanding
      .try_reserve(workers * 2)
      .map_err(|_| SchedulerError::Resources(workers * 2))?;
    Ok(Self {
      total,
      dispatched: 0,
      completed: 0,
      outstanding,
      assignments,
    })
  }

  fn encode<P: Serialize>(
    worker: WorkerId,
    unit: WorkUnit<P>,
  ) -> Result<(u64, Frame), SchedulerError> {
    let id = unit.id;
    let frame = WorkMessage::Work(unit)
      .encode()
      .map_err(|source| SchedulerError::Protocol { worker, source })?;
    Ok((id, frame))
  }

  fn record(&mut self, unit_id: u64, worker: WorkerId, phase: Phase) {
    debug!(unit = unit_id, worker = %worker, phase = ?phase, "Dispatching unit");
    self.outstanding.insert(unit_id, worker);
    self.assignments.push(Assignment {
      unit_id,
      worker,
      phase,
    });
    self.dispatched += 1;
    debug_assert!(self.dispatched <= self.total);
  }

  /// Non-blocking dispatch of `unit` through `slot`.
  fn post<P: Serialize>(
    &mut self,
    slot: &mut RequestSlot,
    unit: WorkUnit<P>,
    phase: Phase,
  ) -> Result<(), SchedulerError> {
    let (id, frame) = Self::encode(slot.worker(), unit)?;
    slot.post_work(frame)?;
    self.record(id, slot.worker(), phase);
    Ok(())
  }

  /// Blocking dispatch of `unit` through `slot`.
  async fn send<P: Serialize>(
    &mut self,
    slot: &mut RequestSlot,
    unit: WorkUnit<P>,
    phase: Phase,
  ) -> Result<(), SchedulerError> {
    let (id, frame) = Self::encode(slot.worker(), unit)?;
    slot.send_work(frame).await?;
    self.record(id, slot.worker(), phase);
    Ok(())
  }

  /// Decodes a result frame, checks it against what was dispatched and merges it.
  fn collect<A>(
    &mut self,
    slot: &mut RequestSlot,
    frame: Frame,
    port: RecvPort,
    aggregator: &mut A,
  ) -> Result<(), SchedulerError>
  where
    A: Aggregator,
    A::Result: DeserializeOwned,
  {
    let worker = slot.worker();
    slot.complete_recv(port);
    let result = ResultUnit::<A::Result>::decode(&frame)
      .map_err(|source| SchedulerError::Protocol { worker, source })?;

    match self.outstanding.remove(&result.id) {
      Some(expected) if expected == worker => {}
      _ => {
        return Err(SchedulerError::UnknownUnit {
          worker,
          unit: result.id,
        });
      }
    }

    if result.outcome.is_failed() {
      warn!(unit = result.id, worker = %worker, "Worker reported a failed unit");
    } else {
      debug!(unit = result.id, worker = %worker, "Collected result");
    }
    aggregator.merge(result);
    self.completed += 1;
    debug_assert!(self.completed <= self.dispatched);
    Ok(())
  }
}

/// Drives a run over a fixed pool of workers.
pub struct Coordinator {
  slots: Vec<RequestSlot>,
  mode: DispatchMode,
}

impl Coordinator {
  /// Builds a coordinator over every link of `endpoint`.
  ///
  /// # Errors
  ///
  /// Fails if the endpoint has no workers or the slot table cannot be
  /// allocated. No message is sent in either case.
  pub fn new(endpoint: CoordinatorEndpoint, mode: DispatchMode) -> Result<Self, SchedulerError> {
    let links = endpoint.into_links();
    if links.is_empty() {
      return Err(SchedulerError::NoWorkers);
    }
    let mut slots = Vec::new();
    slots
      .try_reserve_exact(links.len())
      .map_err(|_| SchedulerError::Resources(links.len()))?;
    slots.extend(links.into_iter().map(RequestSlot::new));
    Ok(Self { slots, mode })
  }

  /// Number of workers in the pool.
  pub fn worker_count(&self) -> usize {
    self.slots.len()
  }

  /// Runs `source` to completion, merging every result into `aggregator`,
  /// then sends the finish sentinel to every worker.
  ///
  /// # Errors
  ///
  /// Any transport or protocol failure aborts the run. Failed units do not:
  /// they are merged as failures and counted in [`RunStats::failed`].
  pub async fn run<S, A>(
    mut self,
    mut source: S,
    mut aggregator: A,
  ) -> Result<RunReport<A::Output>, SchedulerError>
  where
    S: WorkSource,
    S::Payload: Serialize,
    A: Aggregator,
    A::Result: DeserializeOwned,
  {
    let mut ledger = Ledger::new(source.total(), self.slots.len())?;
    info!(
      total = ledger.total,
      workers = self.slots.len(),
      mode = ?self.mode,
      "Starting run"
    );

    match self.mode {
      DispatchMode::Pipelined => {
        self
          .run_pipelined(&mut source, &mut aggregator, &mut ledger)
          .await?
      }
      DispatchMode::WaveBarrier => {
        self
          .run_waves(&mut source, &mut aggregator, &mut ledger)
          .await?
      }
    }

    let pending = self.slots.iter_mut().filter_map(RequestSlot::take_pending_send);
    wait_all(pending.collect::<Vec<_>>()).await?;
    let finish_sent = self.shutdown().await?;

    let stats = RunStats {
      total: ledger.total,
      dispatched: ledger.dispatched,
      completed: ledger.completed,
      failed: aggregator.failed(),
      finish_sent,
    };
    info!(
      completed = stats.completed,
      failed = stats.failed,
      "Run finished"
    );

    Ok(RunReport {
      output: aggregator.finish(),
      stats,
      assignments: ledger.assignments,
      slot_peaks: self.slots.iter().map(RequestSlot::peaks).collect(),
    })
  }

  async fn run_pipelined<S, A>(
    &mut self,
    source: &mut S,
    aggregator: &mut A,
    ledger: &mut Ledger,
  ) -> Result<(), SchedulerError>
  where
    S: WorkSource,
    S::Payload: Serialize,
    A: Aggregator,
    A::Result: DeserializeOwned,
  {
    for slot in &mut self.slots {
      let Some(unit) = source.next_unit() else {
        break;
      };
      ledger.send(slot, unit, Phase::WarmUp).await?;
    }

    let mut receives = RecvSet::new();
    for slot in &mut self.slots {
      if slot.in_flight() == 0 {
        continue;
      }
      receives.push(slot.worker(), slot.post_recv()?);
      if let Some(unit) = source.next_unit() {
        ledger.post(slot, unit, Phase::Prefetch)?;
      }
    }

    let mut draining = false;
    while ledger.completed < ledger.total {
      if !draining && source.remaining() == 0 {
        debug!(in_flight = receives.len(), "Source exhausted, draining");
        draining = true;
      }

      let Some((worker, received)) = receives.wait_any().await else {
        return Err(SchedulerError::Stalled {
          completed: ledger.completed,
          total: ledger.total,
        });
      };
      let (frame, port) = received?;
      let slot = &mut self.slots[worker.index()];
      ledger.collect(slot, frame, port, aggregator)?;

      slot.complete_send().await?;
      if let Some(unit) = source.next_unit() {
        ledger.post(slot, unit, Phase::Refill)?;
      }
      if slot.in_flight() > 0 {
        receives.push(worker, slot.post_recv()?);
      }
    }
    Ok(())
  }

  async fn run_waves<S, A>(
    &mut self,
    source: &mut S,
    aggregator: &mut A,
    ledger: &mut Ledger,
  ) -> Result<(), SchedulerError>
  where
    S: WorkSource,
    S::Payload: Serialize,
    A: Aggregator,
    A::Result: DeserializeOwned,
  {
    let mut wave = 0usize;
    while source.remaining() > 0 {
      let mut receives = RecvSet::new();
      for slot in &mut self.slots {
        let Some(unit) = source.next_unit() else {
          break;
        };
        ledger.send(slot, unit, Phase::Wave).await?;
        receives.push(slot.worker(), slot.post_recv()?);
      }
      debug!(wave, size = receives.len(), "Waiting for wave");

      while let Some((worker, received)) = receives.wait_any().await {
        let (frame, port) = received?;
        ledger.collect(&mut self.slots[worker.index()], frame, port, aggregator)?;
      }
      wave += 1;
    }

    if ledger.completed < ledger.total {
      return Err(SchedulerError::Stalled {
        completed: ledger.completed,
        total: ledger.total,
      });
    }
    Ok(())
  }

  async fn shutdown(&mut self) -> Result<usize, SchedulerError> {
    let mut handles = Vec::with_capacity(self.slots.len());
    for slot in &mut self.slots {
      slot.post_finish()?;
      handles.extend(slot.take_pending_send());
    }
    let sent = handles.len();
    wait_all(handles).await?;
    debug!(workers = sent, "Finish sentinels sent");
    Ok(sent)
  }
}
