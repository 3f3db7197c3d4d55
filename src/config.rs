//! Runtime configuration.

use crate::consts;

// -----------------------------------------------------------------------------
// Storage Config
// -----------------------------------------------------------------------------

/// Runtime settings shared by both storage managers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
  // ---------------------------------------------------------------------------
  // Storage Configuration
  // ---------------------------------------------------------------------------
  pub thread_capacity: usize,
  // ---------------------------------------------------------------------------
  // Tracing Subscriber Configuration
  // ---------------------------------------------------------------------------
  pub tracing_source_file: bool,
  pub tracing_source_line: bool,
  pub tracing_source_name: bool,
  pub tracing_thread_info: bool,
  pub tracing_verbose: bool,
  pub tracing_very_verbose: bool,
}

impl StorageConfig {
  /// Creates a new `StorageConfig` with default values.
  #[inline]
  pub const fn new() -> Self {
    Self {
      thread_capacity: consts::CAP_LIVE_THREADS,
      tracing_source_file: false,
      tracing_source_line: false,
      tracing_source_name: true,
      tracing_thread_info: true,
      tracing_verbose: false,
      tracing_very_verbose: false,
    }
  }

  /// Returns the maximum level of events the subscriber records.
  #[inline]
  pub const fn tracing_filter(&self) -> tracing::Level {
    if self.tracing_very_verbose {
      tracing::Level::TRACE
    } else if self.tracing_verbose {
      tracing::Level::DEBUG
    } else {
      tracing::Level::INFO
    }
  }
}

impl Default for StorageConfig {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

// -----------------------------------------------------------------------------
// Tracing Subscriber
// -----------------------------------------------------------------------------

/// Installs a compact global tracing subscriber configured by `config`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(config: &StorageConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
  use tracing_subscriber::FmtSubscriber;
  use tracing_subscriber::fmt::format;
  use tracing_subscriber::util::SubscriberInitExt;

  FmtSubscriber::builder()
    .event_format(format().compact())
    .log_internal_errors(true)
    .with_ansi(true)
    .with_file(config.tracing_source_file)
    .with_level(true)
    .with_line_number(config.tracing_source_line)
    .with_max_level(config.tracing_filter())
    .with_target(config.tracing_source_name)
    .with_thread_ids(config.tracing_thread_info)
    .with_thread_names(config.tracing_thread_info)
    .finish()
    .try_init()
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config: StorageConfig = StorageConfig::default();

    assert_eq!(config.thread_capacity, consts::CAP_LIVE_THREADS);
    assert_eq!(config.tracing_filter(), tracing::Level::INFO);
  }

  #[test]
  fn test_tracing_filter() {
    let mut config: StorageConfig = StorageConfig::new();

    config.tracing_verbose = true;
    assert_eq!(config.tracing_filter(), tracing::Level::DEBUG);

    config.tracing_very_verbose = true;
    assert_eq!(config.tracing_filter(), tracing::Level::TRACE);
  }

  #[cfg(feature = "tracing")]
  #[test]
  fn test_init_tracing_twice() {
    let config: StorageConfig = StorageConfig::new();

    // Another test binary may already own the global subscriber.
    let _ignore = init_tracing(&config);

    assert!(init_tracing(&config).is_err());
  }
}
