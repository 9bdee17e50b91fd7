use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the `slurm_gcp_config` library.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Failed to read configuration file: {0}")]
  ConfigRead(#[from] io::Error),

  #[error("Failed to parse configuration: {0}")]
  ConfigParse(String),

  #[error("Failed to write configuration to {path:?}: {source}")]
  ConfigWrite {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Failed to serialize configuration: {0}")]
  ConfigSerialize(String),

  #[error("Failed to parse command line: {0}")]
  CommandParse(String),

  #[error("Failed to start '{command}': {source}")]
  CommandSpawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("'{command}' exited with {status}")]
  CommandFailed {
    command: String,
    status: std::process::ExitStatus,
  },

  #[error("Metadata request failed: {0}")]
  Metadata(String),
}

/// A specialized `Result` type for `slurm_gcp_config` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
