//! # StdRawBlockFile
//!
//! [`RawBlockFile`] implementation over a plain `std::fs::File` using unix
//! positional I/O. This is the production backing for recovered objects and
//! for tools that build storage files on a local filesystem; an io-ring
//! based implementation can sit behind the same trait without the core
//! noticing.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

use crate::error::{ErrorKind, StorageError};

use super::RawBlockFile;

#[derive(Debug)]
pub struct StdRawBlockFile {
    file: File,
    path: PathBuf,
}

impl StdRawBlockFile {
    /// Creates (or truncates) a file at `path`, opened read-write.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create storage file '{}'", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)
            .wrap_err_with(|| format!("failed to open storage file '{}'", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

impl RawBlockFile for StdRawBlockFile {
    fn write_some(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.file.write_at(buf, offset).wrap_err_with(|| {
            StorageError::new(
                ErrorKind::Io,
                format!(
                    "write of {} bytes at offset {} to '{}' failed",
                    buf.len(),
                    offset,
                    self.path.display()
                ),
            )
        })
    }

    fn read_some(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.read_at(buf, offset).wrap_err_with(|| {
            StorageError::new(
                ErrorKind::Io,
                format!(
                    "read of {} bytes at offset {} from '{}' failed",
                    buf.len(),
                    offset,
                    self.path.display()
                ),
            )
        })
    }

    fn truncate_at_least(&mut self, size: u64) -> Result<()> {
        let current = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();

        if current < size {
            self.file.set_len(size).wrap_err_with(|| {
                StorageError::new(
                    ErrorKind::Io,
                    format!(
                        "failed to grow '{}' to {} bytes",
                        self.path.display(),
                        size
                    ),
                )
            })?;
        }
        Ok(())
    }
}
