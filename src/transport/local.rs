//! In-process transport backed by bounded tokio channels.
//!
//! Each worker is connected to the coordinator by two channels, one per
//! direction, so delivery is reliable and FIFO per (sender, receiver) pair.
//! Nothing is ordered across different workers.

use super::{RecvPort, SendPort};
use crate::protocol::Frame;
use crate::topology::{Rank, Topology, WorkerId};
use std::time::Duration;
use tokio::sync::mpsc;

/// The coordinator's view of one worker.
#[derive(Debug)]
pub struct WorkerLink {
  /// The worker at the other end.
  pub worker: WorkerId,
  /// Sends work to the worker.
  pub send: SendPort,
  /// Receives results from the worker.
  pub recv: RecvPort,
}

/// Coordinator side of the transport: one link per worker, in rank order.
#[derive(Debug)]
pub struct CoordinatorEndpoint {
  links: Vec<WorkerLink>,
}

impl CoordinatorEndpoint {
  /// Number of connected workers.
  pub fn worker_count(&self) -> usize {
    self.links.len()
  }

  /// Consumes the endpoint, yielding the links in rank order.
  pub fn into_links(self) -> Vec<WorkerLink> {
    self.links
  }
}

/// Worker side of the transport.
#[derive(Debug)]
pub struct WorkerEndpoint {
  /// This worker's id.
  pub id: WorkerId,
  /// Sends results to the coordinator.
  pub send: SendPort,
  /// Receives work from the coordinator.
  pub recv: RecvPort,
}

/// Builder for in-process transports.
#[derive(Debug, Clone)]
pub struct LocalTransport {
  topology: Topology,
  capacity: usize,
  jitter: Duration,
}

impl LocalTransport {
  /// Creates a transport for `topology` with one-slot channels and no jitter.
  pub fn new(topology: Topology) -> Self {
    Self {
      topology,
      capacity: 1,
      jitter: Duration::ZERO,
    }
  }

  /// Sets the per-direction channel capacity (at least 1).
  #[must_use]
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity.max(1);
    self
  }

  /// Delays every send by a random amount up to `jitter`, shuffling
  /// completion order across workers.
  #[must_use]
  pub fn with_jitter(mut self, jitter: Duration) -> Self {
    self.jitter = jitter;
    self
  }

  /// Wires the coordinator to every worker.
  pub fn build(self) -> (CoordinatorEndpoint, Vec<WorkerEndpoint>) {
    let mut links = Vec::with_capacity(self.topology.worker_count());
    let mut workers = Vec::with_capacity(self.topology.worker_count());

    for id in self.topology.workers() {
      let (work_tx, work_rx) = mpsc::channel::<Frame>(self.capacity);
      let (result_tx, result_rx) = mpsc::channel::<Frame>(self.capacity);

      links.push(WorkerLink {
        worker: id,
        send: SendPort::new(id.rank(), work_tx, self.jitter),
        recv: RecvPort::new(id.rank(), result_rx),
      });
      workers.push(WorkerEndpoint {
        id,
        send: SendPort::new(Rank::COORDINATOR, result_tx, self.jitter),
        recv: RecvPort::new(Rank::COORDINATOR, work_rx),
      });
    }

    (CoordinatorEndpoint { links }, workers)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::Tag;
  use crate::transport::{RecvSet, TransportError, wait_all};
  use bytes::Bytes;

  fn frame(byte: u8) -> Frame {
    Frame {
      tag: Tag::Compute,
      body: Bytes::from(vec![byte]),
    }
  }

  fn pair(workers: usize) -> (CoordinatorEndpoint, Vec<WorkerEndpoint>) {
    LocalTransport::new(Topology::with_workers(workers).unwrap()).build()
  }

  #[tokio::test]
  async fn test_build_wires_ranks() {
    let (coordinator, workers) = pair(3);
    assert_eq!(coordinator.worker_count(), 3);
    for (link, worker) in coordinator.into_links().iter().zip(&workers) {
      assert_eq!(link.worker, worker.id);
      assert_eq!(link.send.peer(), worker.id.rank());
      assert_eq!(worker.send.peer(), Rank::COORDINATOR);
    }
  }

  #[tokio::test]
  async fn test_fifo_per_link() {
    let topology = Topology::with_workers(1).unwrap();
    let (coordinator, mut workers) = LocalTransport::new(topology).with_capacity(4).build();
    let link = coordinator.into_links().remove(0);
    let mut worker = workers.remove(0);

    for i in 0..3 {
      link.send.isend(frame(i)).await.unwrap();
    }
    for i in 0..3 {
      assert_eq!(worker.recv.recv().await.unwrap().body[0], i);
    }
  }

  #[tokio::test]
  async fn test_irecv_returns_port() {
    let (coordinator, mut workers) = pair(1);
    let link = coordinator.into_links().remove(0);
    let worker = workers.remove(0);

    let handle = worker.recv.irecv();
    link.send.send(frame(7)).await.unwrap();
    let (got, port) = handle.await.unwrap();
    assert_eq!(got.body[0], 7);
    assert_eq!(port.peer(), Rank::COORDINATOR);
  }

  #[tokio::test]
  async fn test_recv_set_yields_each_worker_once() {
    let (coordinator, workers) = pair(3);
    let mut set = RecvSet::new();
    for link in coordinator.into_links() {
      set.push(link.worker, link.recv.irecv());
    }
    let sends: Vec<_> = workers
      .iter()
      .map(|w| w.send.isend(frame(w.id.index() as u8)))
      .collect();
    wait_all(sends).await.unwrap();

    let mut seen = Vec::new();
    while let Some((worker, received)) = set.wait_any().await {
      let (got, _port) = received.unwrap();
      assert_eq!(got.body[0] as usize, worker.index());
      seen.push(worker.index());
    }
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
  }

  #[tokio::test]
  async fn test_disconnected_peer() {
    let (coordinator, workers) = pair(1);
    drop(workers);
    let link = coordinator.into_links().remove(0);
    let err = link.send.send(frame(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::Disconnected { .. }));
    let err = link.recv.irecv().await.unwrap_err();
    assert!(err.to_string().contains("Peer disconnected"));
  }

  #[tokio::test]
  async fn test_jitter_still_delivers() {
    let topology = Topology::with_workers(1).unwrap();
    let (coordinator, mut workers) = LocalTransport::new(topology)
      .with_jitter(Duration::from_micros(200))
      .build();
    let link = coordinator.into_links().remove(0);
    let handle = link.send.isend(frame(5));
    let got = workers[0].recv.recv().await.unwrap();
    handle.await.unwrap();
    assert_eq!(got.body[0], 5);
  }
}
