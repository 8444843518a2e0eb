//! Log output setup.

use tracing::Level;

/// Installs a `fmt` subscriber printing events at `level` and above.
///
/// Returns `false` if a global subscriber was already installed, which is the
/// normal case when several tests or embedding applications call this.
pub fn init_tracing(level: Level) -> bool {
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(false)
    .try_init()
    .is_ok()
}

/// Installs a subscriber for tests: debug level, output captured by the test
/// harness.
pub fn init_test_tracing() -> bool {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .is_ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_second_init_is_refused() {
    init_test_tracing();
    assert!(!init_tracing(Level::INFO));
  }
}
