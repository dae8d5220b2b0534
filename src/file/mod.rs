//! # Storage Files
//!
//! This module hosts the file-facing half of the bootstrap layer: the
//! [`RawBlockFile`] seam over block-addressable storage, the
//! [`StorageFileBuilder`] that plans and flushes a new storage file, the
//! chain reader, and the [`StorageFile`] view over recovered blocks.
//!
//! ## RawBlockFile Contract
//!
//! The substrate drives storage through three operations: positional
//! `write_some` / `read_some` that may make partial progress, and
//! `truncate_at_least` which grows (never shrinks) the file. Offsets and
//! sizes are bytes; callers keep writes aligned to at least 512 bytes and,
//! for page data, to the page size. The provided [`RawBlockFile::write_all`]
//! and [`RawBlockFile::read_all`] retry partial transfers and fail with an
//! `Io`-kind error if an operation stops making progress.
//!
//! In production the trait sits over a real file ([`StdRawBlockFile`]);
//! tests substitute recording mocks to assert the exact I/O sequence.

mod builder;
mod reader;
mod std_file;
mod storage_file;

pub use builder::{PageDeviceConfigOptions, StorageFileBuilder};
pub use reader::{read_storage_file, StorageFileConfigBlock};
pub use std_file::StdRawBlockFile;
pub use storage_file::StorageFile;

use eyre::{bail, Result};

use crate::error::{ErrorKind, StorageError};

/// Sector written per page during page-array initialization.
pub const PAGE_INIT_SECTOR_SIZE: usize = 512;

/// When enabled (cargo feature `fast-page-init`), the builder elides the
/// explicit zero-fill writes for page arrays; readers must not depend on
/// page contents at recovery time.
pub const FAST_PAGE_DEVICE_INIT: bool = cfg!(feature = "fast-page-init");

/// Abstraction over an aligned, block-addressable file.
pub trait RawBlockFile {
    /// Writes some prefix of `buf` at `offset`, returning the byte count.
    fn write_some(&mut self, offset: u64, buf: &[u8]) -> Result<usize>;

    /// Reads into some prefix of `buf` from `offset`, returning the byte
    /// count; 0 means end of file.
    fn read_some(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Grows the file to at least `size` bytes; no-op if already larger.
    fn truncate_at_least(&mut self, size: u64) -> Result<()>;

    /// Writes all of `buf` at `offset`, retrying partial transfers.
    fn write_all(&mut self, mut offset: u64, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let count = self.write_some(offset, buf)?;
            if count == 0 || count > buf.len() {
                bail!(StorageError::new(
                    ErrorKind::Io,
                    format!(
                        "write at offset {} returned {} of {} bytes",
                        offset,
                        count,
                        buf.len()
                    ),
                ));
            }
            offset += count as u64;
            buf = &buf[count..];
        }
        Ok(())
    }

    /// Fills all of `buf` from `offset`, retrying partial transfers.
    fn read_all(&mut self, mut offset: u64, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let count = self.read_some(offset, buf)?;
            if count == 0 || count > buf.len() {
                bail!(StorageError::new(
                    ErrorKind::Io,
                    format!(
                        "read at offset {} returned {} of {} bytes",
                        offset,
                        count,
                        buf.len()
                    ),
                ));
            }
            offset += count as u64;
            buf = &mut buf[count..];
        }
        Ok(())
    }
}

impl<F: RawBlockFile + ?Sized> RawBlockFile for &mut F {
    fn write_some(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        (**self).write_some(offset, buf)
    }

    fn read_some(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_some(offset, buf)
    }

    fn truncate_at_least(&mut self, size: u64) -> Result<()> {
        (**self).truncate_at_least(size)
    }
}
