//! Per-worker request bookkeeping.

use super::{Operation, SchedulerError};
use crate::protocol::Frame;
use crate::topology::WorkerId;
use crate::transport::{RecvHandle, RecvPort, SendHandle, SendPort, WorkerLink};

/// Highest load a slot has seen.
///
/// Outstanding sends and receives are not counted: a second post of either
/// is refused with [`SchedulerError::SlotBusy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotPeaks {
  /// Units dispatched to the worker whose results had not been collected.
  pub units_in_flight: usize,
}

/// Everything the coordinator tracks about one worker.
///
/// At most one send and one receive may be outstanding. A pending send keeps
/// its frame until [`RequestSlot::complete_send`] observes completion, and the
/// receive port is absent from the slot while a receive is posted.
#[derive(Debug)]
pub struct RequestSlot {
  worker: WorkerId,
  send_port: SendPort,
  recv_port: Option<RecvPort>,
  pending_send: Option<SendHandle>,
  in_flight: usize,
  peaks: SlotPeaks,
}

impl RequestSlot {
  /// Takes ownership of the link to one worker.
  pub fn new(link: WorkerLink) -> Self {
    Self {
      worker: link.worker,
      send_port: link.send,
      recv_port: Some(link.recv),
      pending_send: None,
      in_flight: 0,
      peaks: SlotPeaks::default(),
    }
  }

  /// The worker this slot tracks.
  pub fn worker(&self) -> WorkerId {
    self.worker
  }

  /// Units sent to the worker and not yet collected.
  pub fn in_flight(&self) -> usize {
    self.in_flight
  }

  /// Returns `true` while a send is outstanding.
  pub fn send_pending(&self) -> bool {
    self.pending_send.is_some()
  }

  /// Returns `true` while a receive is outstanding.
  pub fn recv_pending(&self) -> bool {
    self.recv_port.is_none()
  }

  /// Peak concurrency observed so far.
  pub fn peaks(&self) -> SlotPeaks {
    self.peaks
  }

  fn busy(&self, operation: Operation) -> SchedulerError {
    SchedulerError::SlotBusy {
      worker: self.worker,
      operation,
    }
  }

  fn post_send(&mut self, frame: Frame) -> Result<(), SchedulerError> {
    if self.pending_send.is_some() {
      return Err(self.busy(Operation::Send));
    }
    self.pending_send = Some(self.send_port.isend(frame));
    Ok(())
  }

  fn unit_sent(&mut self) {
    self.in_flight += 1;
    self.peaks.units_in_flight = self.peaks.units_in_flight.max(self.in_flight);
  }

  /// Posts a non-blocking send of a work frame.
  pub fn post_work(&mut self, frame: Frame) -> Result<(), SchedulerError> {
    self.post_send(frame)?;
    self.unit_sent();
    Ok(())
  }

  /// Sends a work frame and waits for the send to complete.
  pub async fn send_work(&mut self, frame: Frame) -> Result<(), SchedulerError> {
    self.post_send(frame)?;
    self.unit_sent();
    self.complete_send().await
  }

  /// Posts the finish sentinel.
  pub fn post_finish(&mut self) -> Result<(), SchedulerError> {
    self.post_send(Frame::finish())
  }

  /// Waits for the outstanding send, if any. After this returns the frame
  /// buffer has been released.
  pub async fn complete_send(&mut self) -> Result<(), SchedulerError> {
    if let Some(handle) = self.pending_send.take() {
      handle.await?;
    }
    Ok(())
  }

  /// Hands the outstanding send over to the caller.
  pub fn take_pending_send(&mut self) -> Option<SendHandle> {
    self.pending_send.take()
  }

  /// Posts a receive for the worker's next result.
  pub fn post_recv(&mut self) -> Result<RecvHandle, SchedulerError> {
    let port = self
      .recv_port
      .take()
      .ok_or_else(|| self.busy(Operation::Receive))?;
    Ok(port.irecv())
  }

  /// Returns the port after a receive completed and accounts for the
  /// collected unit.
  pub fn complete_recv(&mut self, port: RecvPort) {
    self.recv_port = Some(port);
    self.in_flight = self.in_flight.saturating_sub(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::Tag;
  use crate::topology::Topology;
  use crate::transport::LocalTransport;
  use bytes::Bytes;

  fn work_frame() -> Frame {
    Frame {
      tag: Tag::Compute,
      body: Bytes::from_static(b"{}"),
    }
  }

  fn slot() -> (RequestSlot, crate::transport::WorkerEndpoint) {
    let topology = Topology::with_workers(1).unwrap();
    let (coordinator, mut workers) = LocalTransport::new(topology).with_capacity(4).build();
    let link = coordinator.into_links().remove(0);
    (RequestSlot::new(link), workers.remove(0))
  }

  #[tokio::test]
  async fn test_second_send_is_rejected_until_complete() {
    let (mut slot, _worker) = slot();
    slot.post_work(work_frame()).unwrap();
    let err = slot.post_work(work_frame()).unwrap_err();
    assert!(matches!(
      err,
      SchedulerError::SlotBusy {
        operation: Operation::Send,
        ..
      }
    ));
    slot.complete_send().await.unwrap();
    assert!(!slot.send_pending());
    slot.post_work(work_frame()).unwrap();
    assert_eq!(slot.in_flight(), 2);
    assert!(slot.send_pending());
  }

  #[tokio::test]
  async fn test_second_receive_is_rejected() {
    let (mut slot, worker) = slot();
    let handle = slot.post_recv().unwrap();
    assert!(slot.recv_pending());
    assert!(matches!(
      slot.post_recv(),
      Err(SchedulerError::SlotBusy {
        operation: Operation::Receive,
        ..
      })
    ));

    worker.send.send(work_frame()).await.unwrap();
    let (_frame, port) = handle.await.unwrap();
    slot.complete_recv(port);
    assert!(!slot.recv_pending());
    assert!(slot.post_recv().is_ok());
  }

  #[tokio::test]
  async fn test_in_flight_tracks_dispatch_and_collection() {
    let (mut slot, mut worker) = slot();
    slot.send_work(work_frame()).await.unwrap();
    slot.post_work(work_frame()).unwrap();
    assert_eq!(slot.peaks().units_in_flight, 2);

    worker.recv.recv().await.unwrap();
    let handle = slot.post_recv().unwrap();
    worker.send.send(work_frame()).await.unwrap();
    let (_, port) = handle.await.unwrap();
    slot.complete_recv(port);
    assert_eq!(slot.in_flight(), 1);
  }
}
