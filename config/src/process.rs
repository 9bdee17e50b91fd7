//! Blocking and non-blocking subprocess helpers used by the node scripts.

use std::{
  process::{Child, Command, ExitStatus, Stdio},
  thread,
  time::Duration,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Sleep this long after the command returns.
  pub wait: Duration,
  /// Skip the debug log line for the command.
  pub quiet: bool,
  /// Capture stdout instead of inheriting it.
  pub capture_stdout: bool,
  /// Run through `sh -c` instead of splitting the command line.
  pub shell: bool,
  /// Turn a non-zero exit status into [`Error::CommandFailed`].
  pub check: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
  pub quiet: bool,
  pub shell: bool,
}

/// A finished command.
#[derive(Debug, Clone)]
pub struct Completed {
  pub status: ExitStatus,
  /// Present only when [`RunOptions::capture_stdout`] was set.
  pub stdout: Option<String>,
}

impl Completed {
  pub fn success(&self) -> bool {
    self.status.success()
  }
}

/// Runs `cmd` to completion.
pub fn run(cmd: &str, options: &RunOptions) -> Result<Completed> {
  if !options.quiet {
    tracing::debug!("run: {}", cmd);
  }

  let mut command = build_command(cmd, options.shell)?;
  if options.capture_stdout {
    command.stdout(Stdio::piped());
  }

  let output = command.output().map_err(|source| Error::CommandSpawn {
    command: cmd.to_string(),
    source,
  })?;

  if !options.wait.is_zero() {
    thread::sleep(options.wait);
  }

  if options.check && !output.status.success() {
    return Err(Error::CommandFailed {
      command: cmd.to_string(),
      status: output.status,
    });
  }

  Ok(Completed {
    status: output.status,
    stdout: options
      .capture_stdout
      .then(|| String::from_utf8_lossy(&output.stdout).into_owned()),
  })
}

/// Starts `cmd` and returns without waiting for it.
pub fn spawn(cmd: &str, options: &SpawnOptions) -> Result<Child> {
  if !options.quiet {
    tracing::debug!("spawn: {}", cmd);
  }
  build_command(cmd, options.shell)?
    .spawn()
    .map_err(|source| Error::CommandSpawn {
      command: cmd.to_string(),
      source,
    })
}

fn build_command(cmd: &str, shell: bool) -> Result<Command> {
  if shell {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    return Ok(command);
  }

  let args = shlex::split(cmd)
    .ok_or_else(|| Error::CommandParse(format!("unbalanced quoting in '{}'", cmd)))?;
  let (program, rest) = args
    .split_first()
    .ok_or_else(|| Error::CommandParse("empty command".to_string()))?;
  let mut command = Command::new(program);
  command.args(rest);
  Ok(command)
}
