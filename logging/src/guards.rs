// Holds onto resources that need to be kept alive for the duration of logging
// and cleaned up on drop, like tracing-appender's WorkerGuards.

use tracing_appender::non_blocking::WorkerGuard;

/// Returned by [`init`](crate::init). Dropping it flushes buffered file output.
#[must_use = "The LoggingGuard must be kept alive for file logging to flush on exit"]
#[derive(Default)]
pub struct LoggingGuard {
  guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add(&mut self, guard: WorkerGuard) {
    self.guards.push(guard);
  }

  /// True when logging goes to stdout and nothing needs flushing.
  pub fn is_empty(&self) -> bool {
    self.guards.is_empty()
  }
}
