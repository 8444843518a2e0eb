//! The compute backend seam.
//!
//! Workers know nothing about what they compute: they hand each payload to a
//! [`Compute`] implementation and ship back whatever it returns. A backend
//! error does not stop the worker; it is reported to the coordinator as a
//! failed unit.

/// Backend failure on one unit.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ComputeError {
  /// The input cannot be processed (wrong shape, out of domain).
  #[error("Invalid input: {0}")]
  InvalidInput(String),
  /// The backend itself failed.
  #[error("Compute failed: {0}")]
  Failed(String),
}

/// A synchronous function from work payload to result payload.
pub trait Compute: Send + Sync + 'static {
  /// Work payload.
  type Input: Send + 'static;
  /// Result payload.
  type Output: Send + 'static;

  /// Computes one unit.
  fn compute(&self, input: Self::Input) -> Result<Self::Output, ComputeError>;
}

/// Adapts a closure into a [`Compute`] backend.
pub struct FnCompute<F, I, O> {
  function: F,
  _types: std::marker::PhantomData<fn(I) -> O>,
}

impl<F, I, O> FnCompute<F, I, O>
where
  F: Fn(I) -> Result<O, ComputeError> + Send + Sync + 'static,
{
  /// Wraps `function`.
  pub fn new(function: F) -> Self {
    Self {
      function,
      _types: std::marker::PhantomData,
    }
  }
}

impl<F, I, O> Compute for FnCompute<F, I, O>
where
  F: Fn(I) -> Result<O, ComputeError> + Send + Sync + 'static,
  I: Send + 'static,
  O: Send + 'static,
{
  type Input = I;
  type Output = O;

  fn compute(&self, input: I) -> Result<O, ComputeError> {
    (self.function)(input)
  }
}

/// Creates a [`Compute`] backend from a closure.
pub fn compute_fn<F, I, O>(function: F) -> FnCompute<F, I, O>
where
  F: Fn(I) -> Result<O, ComputeError> + Send + Sync + 'static,
{
  FnCompute::new(function)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_compute_fn() {
    let double = compute_fn(|x: u32| Ok::<_, ComputeError>(x * 2));
    assert_eq!(double.compute(21), Ok(42));
  }

  #[test]
  fn test_compute_fn_error() {
    let picky = compute_fn(|x: i32| {
      if x < 0 {
        Err(ComputeError::InvalidInput(format!("negative: {}", x)))
      } else {
        Ok(x)
      }
    });
    let err = picky.compute(-1).unwrap_err();
    assert_eq!(err.to_string(), "Invalid input: negative: -1");
  }
}
