// Scoped working-directory changes.

use std::{
  env, io,
  path::{Path, PathBuf},
};

/// Changes the working directory and restores the previous one on drop.
#[must_use = "the previous directory is restored when the guard is dropped"]
#[derive(Debug)]
pub struct DirGuard {
  previous: PathBuf,
}

impl DirGuard {
  pub fn enter(path: impl AsRef<Path>) -> io::Result<Self> {
    let previous = env::current_dir()?;
    env::set_current_dir(path)?;
    Ok(Self { previous })
  }

  pub fn previous(&self) -> &Path {
    &self.previous
  }
}

impl Drop for DirGuard {
  fn drop(&mut self) {
    if let Err(e) = env::set_current_dir(&self.previous) {
      tracing::error!(path = ?self.previous, error = %e, "Failed to restore working directory");
    }
  }
}

/// Runs `f` with `path` as the working directory.
pub fn with_dir<T>(path: impl AsRef<Path>, f: impl FnOnce() -> T) -> io::Result<T> {
  let _guard = DirGuard::enter(path)?;
  Ok(f())
}
