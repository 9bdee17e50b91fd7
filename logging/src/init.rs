// Contains the primary public initialization function for slurm_gcp_logging.

use crate::{
  error::{Error, Result},
  guards::LoggingGuard,
  watched::WatchedFile,
};

use std::{fs, io, panic, path::PathBuf};

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Target of the shared config and process helpers, which get their own level.
pub const UTIL_TARGET: &str = "slurm_gcp_config";

/// Root logger settings.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
  /// Level for everything, e.g. `"DEBUG"` or `"info"`.
  pub level: String,
  /// Level for [`UTIL_TARGET`]; defaults to `level`.
  pub util_level: Option<String>,
  /// Log to this file with timestamps instead of plain lines on stdout.
  pub file: Option<PathBuf>,
}

impl Default for LoggingOptions {
  fn default() -> Self {
    Self {
      level: "DEBUG".to_string(),
      util_level: None,
      file: None,
    }
  }
}

/// Parses a level name, accepting the `WARNING`/`CRITICAL` spellings used by
/// the older scripts.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
  match level.trim().to_ascii_lowercase().as_str() {
    "trace" => Ok(LevelFilter::TRACE),
    "debug" => Ok(LevelFilter::DEBUG),
    "info" => Ok(LevelFilter::INFO),
    "warn" | "warning" => Ok(LevelFilter::WARN),
    "error" | "critical" | "fatal" => Ok(LevelFilter::ERROR),
    "off" => Ok(LevelFilter::OFF),
    other => Err(Error::InvalidConfigValue {
      field: "level".to_string(),
      message: format!(
        "Unknown level '{}'. Expected 'trace', 'debug', 'info', 'warning', 'error', \
         'critical' or 'off'.",
        other
      ),
    }),
  }
}

/// Builds the filter directive `"{level},slurm_gcp_config={util_level}"`.
pub fn build_filter(options: &LoggingOptions) -> Result<EnvFilter> {
  let level = parse_level(&options.level)?;
  let util_level = match &options.util_level {
    Some(util_level) => parse_level(util_level)?,
    None => level,
  };
  let directives = format!("{},{}={}", level, UTIL_TARGET, util_level);
  EnvFilter::try_new(&directives).map_err(|e| Error::InvalidConfigValue {
    field: "level".to_string(),
    message: format!("'{}': {}", directives, e),
  })
}

/// Installs the global subscriber and [`install_panic_hook`]. Can succeed only
/// once per process.
pub fn init(options: &LoggingOptions) -> Result<LoggingGuard> {
  let filter = build_filter(options)?;
  let mut guard = LoggingGuard::new();
  let registry = tracing_subscriber::registry().with(filter);

  let installed = match &options.file {
    None => registry
      .with(
        fmt::layer()
          .with_writer(io::stdout)
          .without_time()
          .with_target(false)
          .with_level(false),
      )
      .try_init(),
    Some(path) => {
      if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
          fs::create_dir_all(parent_dir).map_err(|e| Error::AppenderSetup {
            appender_name: path.display().to_string(),
            reason: format!("Failed to create directory {:?}: {}", parent_dir, e),
          })?;
        }
      }

      let file_writer = WatchedFile::open(path).map_err(|e| Error::AppenderSetup {
        appender_name: path.display().to_string(),
        reason: format!("Failed to open file {:?}: {}", path, e),
      })?;

      let (non_blocking_writer, worker_guard) = tracing_appender::non_blocking(file_writer);
      guard.add(worker_guard);
      registry
        .with(
          fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false),
        )
        .try_init()
    }
  };

  installed.map_err(|e| Error::GlobalSubscriberSet(e.to_string()))?;
  install_panic_hook();
  Ok(guard)
}

/// Logs every panic as a fatal error, then hands it to the previously
/// installed hook.
pub fn install_panic_hook() {
  let previous = panic::take_hook();
  panic::set_hook(Box::new(move |info| {
    let payload = info
      .payload()
      .downcast_ref::<&str>()
      .copied()
      .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
      .unwrap_or("Box<dyn Any>");
    let location = info
      .location()
      .map(|l| l.to_string())
      .unwrap_or_else(|| "unknown".to_string());
    tracing::error!(location = %location, "Fatal exception: {}", payload);
    previous(info);
  }));
}
