use thiserror::Error;

/// The main error type for the `slurm_gcp_logging` library.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidConfigValue { field: String, message: String },

  #[error("Appender setup failed for '{appender_name}': {reason}")]
  AppenderSetup {
    appender_name: String,
    reason: String,
  },

  #[error("Failed to set global tracing subscriber: {0}")]
  GlobalSubscriberSet(String),
}

/// A specialized `Result` type for `slurm_gcp_logging` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
