// A log file writer that follows external rotation.

use std::{
  fs::{self, File, Metadata, OpenOptions},
  io::{self, Write},
  path::{Path, PathBuf},
};

/// Appends to `path`, reopening it when the file at `path` was moved away or
/// deleted since it was opened (e.g. by logrotate).
#[derive(Debug)]
pub(crate) struct WatchedFile {
  path: PathBuf,
  file: File,
  id: Option<(u64, u64)>,
}

impl WatchedFile {
  pub(crate) fn open(path: &Path) -> io::Result<Self> {
    let file = open_append(path)?;
    let id = file_id(&file.metadata()?);
    Ok(Self {
      path: path.to_path_buf(),
      file,
      id,
    })
  }

  fn reopen_if_moved(&mut self) -> io::Result<()> {
    let moved = match fs::metadata(&self.path) {
      Ok(meta) => file_id(&meta) != self.id,
      Err(_) => true,
    };
    if moved {
      // Whatever is still buffered belongs to the old file.
      let _ = self.file.flush();
      self.file = open_append(&self.path)?;
      self.id = file_id(&self.file.metadata()?);
    }
    Ok(())
  }
}

impl Write for WatchedFile {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.reopen_if_moved()?;
    self.file.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.file.flush()
  }
}

fn open_append(path: &Path) -> io::Result<File> {
  OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<(u64, u64)> {
  use std::os::unix::fs::MetadataExt;
  Some((meta.dev(), meta.ino()))
}

// Without inode numbers only deletion is noticed.
#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<(u64, u64)> {
  None
}
