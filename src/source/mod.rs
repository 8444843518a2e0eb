//! Work sources: finite, ordered producers of [`WorkUnit`]s.
//!
//! A source knows its total up front and hands out units in a deterministic
//! order with `id` equal to the unit's position. Re-running a source with the
//! same inputs reproduces the same units.

pub mod range;
pub mod tiles;

pub use range::{Interval, RangeSource};
pub use tiles::{Tile, TileSource};

use crate::protocol::WorkUnit;

/// Produces the units of one run.
pub trait WorkSource {
  /// Payload carried by each unit.
  type Payload;

  /// Number of units the source yields in total.
  fn total(&self) -> usize;

  /// Next unit, or `None` once exhausted.
  fn next_unit(&mut self) -> Option<WorkUnit<Self::Payload>>;

  /// Units not yet handed out.
  fn remaining(&self) -> usize;
}

/// A source over a pre-built list of payloads.
#[derive(Debug, Clone)]
pub struct VecSource<P> {
  payloads: std::vec::IntoIter<P>,
  total: usize,
  next_id: u64,
}

impl<P> VecSource<P> {
  /// Creates a source yielding `payloads` in order.
  pub fn new(payloads: Vec<P>) -> Self {
    Self {
      total: payloads.len(),
      payloads: payloads.into_iter(),
      next_id: 0,
    }
  }
}

impl<P> WorkSource for VecSource<P> {
  type Payload = P;

  fn total(&self) -> usize {
    self.total
  }

  fn next_unit(&mut self) -> Option<WorkUnit<P>> {
    let payload = self.payloads.next()?;
    let unit = WorkUnit::new(self.next_id, payload);
    self.next_id += 1;
    Some(unit)
  }

  fn remaining(&self) -> usize {
    self.payloads.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vec_source_assigns_positional_ids() {
    let mut source = VecSource::new(vec!["a", "b", "c"]);
    assert_eq!(source.total(), 3);
    let ids: Vec<u64> = std::iter::from_fn(|| source.next_unit()).map(|u| u.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(source.remaining(), 0);
    assert!(source.next_unit().is_none());
  }

  #[test]
  fn test_empty_vec_source() {
    let mut source = VecSource::<u8>::new(Vec::new());
    assert_eq!(source.total(), 0);
    assert!(source.next_unit().is_none());
  }
}
