//! Point-to-point messaging between the coordinator and its workers.
//!
//! The transport offers non-blocking send and receive primitives that return
//! handles, blocking variants of both, and helpers to wait for any or all of a
//! set of outstanding handles.
//!
//! ## Buffer ownership
//!
//! A [`SendHandle`] owns the frame it is delivering until the handle reports
//! completion, so a caller cannot touch an in-flight buffer. A receive consumes
//! its [`RecvPort`] and hands it back together with the received frame, so a
//! second receive on the same link cannot be posted while one is outstanding.
//!
//! Both kinds of operation run as spawned tasks and make progress while the
//! caller is busy elsewhere (computing a tile, merging a result).

pub mod local;

use crate::protocol::Frame;
use crate::topology::{Rank, WorkerId};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use local::{CoordinatorEndpoint, LocalTransport, WorkerEndpoint, WorkerLink};

/// Errors raised by the transport. All of them are fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  /// The other end of the link is gone.
  #[error("Peer disconnected: {peer}")]
  Disconnected {
    /// Rank of the peer that went away.
    peer: Rank,
  },

  /// The task driving a send or receive panicked or was cancelled.
  #[error("Transport task failed: {0}")]
  TaskFailed(String),
}

/// Sending half of a link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SendPort {
  peer: Rank,
  tx: mpsc::Sender<Frame>,
  jitter: Duration,
}

impl SendPort {
  pub(crate) fn new(peer: Rank, tx: mpsc::Sender<Frame>, jitter: Duration) -> Self {
    Self { peer, tx, jitter }
  }

  /// Rank of the receiving side.
  pub fn peer(&self) -> Rank {
    self.peer
  }

  /// Posts a non-blocking send. The frame is owned by the returned handle
  /// until the send completes.
  pub fn isend(&self, frame: Frame) -> SendHandle {
    let tx = self.tx.clone();
    let peer = self.peer;
    let delay = self.pick_delay();
    let inner = tokio::spawn(async move {
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }
      tx.send(frame)
        .await
        .map_err(|_| TransportError::Disconnected { peer })
    });
    SendHandle { peer, inner }
  }

  /// Sends a frame and waits for the send to complete.
  pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
    self.isend(frame).await
  }

  fn pick_delay(&self) -> Option<Duration> {
    use rand::Rng;

    let max = self.jitter.as_micros() as u64;
    if max == 0 {
      return None;
    }
    let micros = rand::thread_rng().gen_range(0..=max);
    Some(Duration::from_micros(micros))
  }
}

/// Receiving half of a link. Not clonable: only one receive can be pending.
#[derive(Debug)]
pub struct RecvPort {
  peer: Rank,
  rx: mpsc::Receiver<Frame>,
}

impl RecvPort {
  pub(crate) fn new(peer: Rank, rx: mpsc::Receiver<Frame>) -> Self {
    Self { peer, rx }
  }

  /// Rank of the sending side.
  pub fn peer(&self) -> Rank {
    self.peer
  }

  /// Posts a non-blocking receive. The port travels with the handle and is
  /// returned alongside the frame.
  ///
  /// Dropping the handle before it completes abandons the port.
  pub fn irecv(mut self) -> RecvHandle {
    let peer = self.peer;
    let inner = tokio::spawn(async move {
      match self.rx.recv().await {
        Some(frame) => Ok((frame, self)),
        None => Err(TransportError::Disconnected { peer }),
      }
    });
    RecvHandle { peer, inner }
  }

  /// Waits for the next frame.
  pub async fn recv(&mut self) -> Result<Frame, TransportError> {
    self
      .rx
      .recv()
      .await
      .ok_or(TransportError::Disconnected { peer: self.peer })
  }
}

fn join_failed(e: tokio::task::JoinError) -> TransportError {
  TransportError::TaskFailed(e.to_string())
}

/// Completion handle for a posted send.
#[derive(Debug)]
pub struct SendHandle {
  peer: Rank,
  inner: JoinHandle<Result<(), TransportError>>,
}

impl SendHandle {
  /// Rank the frame is addressed to.
  pub fn peer(&self) -> Rank {
    self.peer
  }

  /// Returns `true` once the send has completed, without waiting.
  pub fn is_complete(&self) -> bool {
    self.inner.is_finished()
  }
}

impl Future for SendHandle {
  type Output = Result<(), TransportError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.inner)
      .poll(cx)
      .map(|joined| joined.map_err(join_failed).and_then(|sent| sent))
  }
}

/// Completion handle for a posted receive.
#[derive(Debug)]
pub struct RecvHandle {
  peer: Rank,
  inner: JoinHandle<Result<(Frame, RecvPort), TransportError>>,
}

impl RecvHandle {
  /// Rank the frame is expected from.
  pub fn peer(&self) -> Rank {
    self.peer
  }
}

impl Future for RecvHandle {
  type Output = Result<(Frame, RecvPort), TransportError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.inner)
      .poll(cx)
      .map(|joined| joined.map_err(join_failed).and_then(|received| received))
  }
}

/// Waits for every send handle to complete, failing on the first error.
pub async fn wait_all<I>(handles: I) -> Result<(), TransportError>
where
  I: IntoIterator<Item = SendHandle>,
{
  futures::future::try_join_all(handles).await.map(|_| ())
}

type KeyedRecv = BoxFuture<'static, (WorkerId, Result<(Frame, RecvPort), TransportError>)>;

/// A bounded set of outstanding receives, one per worker at most.
///
/// [`RecvSet::wait_any`] yields whichever receive completes first; no order
/// between workers is implied.
#[derive(Default)]
pub struct RecvSet {
  pending: FuturesUnordered<KeyedRecv>,
}

impl RecvSet {
  /// Creates an empty set.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a posted receive for `worker`.
  pub fn push(&mut self, worker: WorkerId, handle: RecvHandle) {
    self
      .pending
      .push(handle.map(move |received| (worker, received)).boxed());
  }

  /// Number of outstanding receives.
  pub fn len(&self) -> usize {
    self.pending.len()
  }

  /// Returns `true` if nothing is outstanding.
  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  /// Waits for the first outstanding receive to complete. Returns `None` when
  /// the set is empty.
  pub async fn wait_any(
    &mut self,
  ) -> Option<(WorkerId, Result<(Frame, RecvPort), TransportError>)> {
    self.pending.next().await
  }
}
