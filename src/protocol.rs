//! Communication protocol between the coordinator and its workers.
//!
//! Defines the message envelopes (work units, result units, the finish
//! sentinel) and their encoding into transport [`Frame`]s.
//!
//! Every frame carries a [`Tag`] from a small reserved set. Work and results
//! travel under [`Tag::Compute`]; shutdown is [`Tag::Finish`] with an empty
//! body. Because the sentinel is its own variant rather than a zero-length
//! compute message, an empty compute body is rejected instead of being
//! mistaken for either work or shutdown.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tag {
  /// Work assignment (coordinator to worker) or its result (worker to coordinator).
  Compute = 0,
  /// No more work; the worker drains and exits.
  Finish = 1,
}

/// One message as seen by the transport: a tag plus opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  /// Reserved tag distinguishing work from shutdown.
  pub tag: Tag,
  /// Encoded body; empty for [`Tag::Finish`].
  pub body: Bytes,
}

impl Frame {
  /// The finish sentinel frame.
  pub fn finish() -> Self {
    Self {
      tag: Tag::Finish,
      body: Bytes::new(),
    }
  }

  /// Size of the body in bytes.
  pub fn len(&self) -> usize {
    self.body.len()
  }

  /// Returns `true` if the body is empty.
  pub fn is_empty(&self) -> bool {
    self.body.is_empty()
  }
}

/// One schedulable piece of input.
///
/// `id` is unique within a run and equals the unit's position in its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit<P> {
  /// Row-major index of the unit in its source.
  pub id: u64,
  /// Backend input.
  pub payload: P,
}

impl<P> WorkUnit<P> {
  /// Creates a work unit.
  pub fn new(id: u64, payload: P) -> Self {
    Self { id, payload }
  }
}

/// What happened to a unit on the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitOutcome<R> {
  /// The backend produced a result.
  Completed(R),
  /// The backend failed; the reason is carried back instead of the payload.
  Failed(String),
}

impl<R> UnitOutcome<R> {
  /// Returns `true` for [`UnitOutcome::Failed`].
  pub fn is_failed(&self) -> bool {
    matches!(self, UnitOutcome::Failed(_))
  }
}

/// The computed output for one [`WorkUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultUnit<R> {
  /// Id of the originating work unit.
  pub id: u64,
  /// Result payload or failure reason.
  pub outcome: UnitOutcome<R>,
}

impl<R> ResultUnit<R> {
  /// A successful result.
  pub fn completed(id: u64, payload: R) -> Self {
    Self {
      id,
      outcome: UnitOutcome::Completed(payload),
    }
  }

  /// A degraded result recording why the unit failed.
  pub fn failed(id: u64, reason: impl Into<String>) -> Self {
    Self {
      id,
      outcome: UnitOutcome::Failed(reason.into()),
    }
  }
}

impl<R: Serialize> ResultUnit<R> {
  /// Encodes the result into a [`Tag::Compute`] frame.
  pub fn encode(&self) -> Result<Frame, ProtocolError> {
    let body = serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    Ok(Frame {
      tag: Tag::Compute,
      body: Bytes::from(body),
    })
  }
}

impl<R: DeserializeOwned> ResultUnit<R> {
  /// Decodes a result frame sent by a worker.
  pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
    match frame.tag {
      Tag::Compute if frame.body.is_empty() => Err(ProtocolError::EmptyPayload),
      Tag::Compute => serde_json::from_slice(&frame.body)
        .map_err(|e| ProtocolError::Deserialization(e.to_string())),
      other => Err(ProtocolError::UnexpectedTag(other)),
    }
  }
}

/// Messages a worker can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkMessage<P> {
  /// A unit to compute.
  Work(WorkUnit<P>),
  /// Stop after draining outstanding sends.
  Finish,
}

impl<P: Serialize> WorkMessage<P> {
  /// Encodes the message into a frame.
  pub fn encode(&self) -> Result<Frame, ProtocolError> {
    match self {
      WorkMessage::Work(unit) => {
        let body =
          serde_json::to_vec(unit).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Ok(Frame {
          tag: Tag::Compute,
          body: Bytes::from(body),
        })
      }
      WorkMessage::Finish => Ok(Frame::finish()),
    }
  }
}

impl<P: DeserializeOwned> WorkMessage<P> {
  /// Decodes a frame sent by the coordinator.
  pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
    match frame.tag {
      Tag::Finish => Ok(WorkMessage::Finish),
      Tag::Compute if frame.body.is_empty() => Err(ProtocolError::EmptyPayload),
      Tag::Compute => serde_json::from_slice(&frame.body)
        .map(WorkMessage::Work)
        .map_err(|e| ProtocolError::Deserialization(e.to_string())),
    }
  }
}

/// Protocol-related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
  /// Message serialization failed.
  Serialization(String),
  /// Message deserialization failed.
  Deserialization(String),
  /// A compute frame arrived without a body.
  EmptyPayload,
  /// A valid tag in a direction where it is not allowed.
  UnexpectedTag(Tag),
}

impl fmt::Display for ProtocolError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProtocolError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
      ProtocolError::Deserialization(msg) => write!(f, "Deserialization error: {}", msg),
      ProtocolError::EmptyPayload => write!(f, "Compute frame has an empty payload"),
      ProtocolError::UnexpectedTag(tag) => write!(f, "Unexpected tag: {:?}", tag),
    }
  }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tag_discriminants() {
    assert_eq!(Tag::Compute as u8, 0);
    assert_eq!(Tag::Finish as u8, 1);
  }

  #[test]
  fn test_work_message_encode_decode() {
    let msg = WorkMessage::Work(WorkUnit::new(3, (0.5f64, 1.5f64)));
    let frame = msg.encode().unwrap();
    assert_eq!(frame.tag, Tag::Compute);
    assert_eq!(WorkMessage::<(f64, f64)>::decode(&frame).unwrap(), msg);
  }

  #[test]
  fn test_finish_is_its_own_variant() {
    let frame = WorkMessage::<u32>::Finish.encode().unwrap();
    assert_eq!(frame, Frame::finish());
    assert!(frame.is_empty());
    assert_eq!(WorkMessage::<u32>::decode(&frame).unwrap(), WorkMessage::Finish);
  }

  #[test]
  fn test_empty_compute_frame_is_rejected() {
    let frame = Frame {
      tag: Tag::Compute,
      body: Bytes::new(),
    };
    assert_eq!(
      WorkMessage::<u32>::decode(&frame),
      Err(ProtocolError::EmptyPayload)
    );
    assert_eq!(
      ResultUnit::<u32>::decode(&frame),
      Err(ProtocolError::EmptyPayload)
    );
  }

  #[test]
  fn test_result_decode_rejects_finish_tag() {
    assert_eq!(
      ResultUnit::<u32>::decode(&Frame::finish()),
      Err(ProtocolError::UnexpectedTag(Tag::Finish))
    );
  }

  #[test]
  fn test_failed_result_survives_encoding() {
    let result = ResultUnit::<f64>::failed(9, "kernel exploded");
    let decoded = ResultUnit::<f64>::decode(&result.encode().unwrap()).unwrap();
    assert_eq!(decoded.id, 9);
    assert!(decoded.outcome.is_failed());
  }

  #[test]
  fn test_protocol_error_display() {
    let err = ProtocolError::Deserialization("bad".to_string());
    assert!(err.to_string().contains("Deserialization error"));
    assert!(ProtocolError::EmptyPayload.to_string().contains("empty payload"));
  }
}
