//! `slurm_gcp_logging` - root logger setup for the slurm-gcp node scripts.
//!
//! Everything in the workspace logs through `tracing`. Entry points call
//! [`init`] once with the levels and optional log file they were started with
//! and keep the returned [`LoggingGuard`] alive until exit.

pub mod error;
mod guards;
pub mod init;
mod watched;

pub use error::{Error, Result};
pub use guards::LoggingGuard;
pub use init::{
  build_filter, init, install_panic_hook, parse_level, LoggingOptions, UTIL_TARGET,
};
