//! # PageDevice Recovery
//!
//! A page device is a storage object owning a contiguous array of
//! `page_count` pages of `1 << page_size_log2` bytes. Recovery validates
//! the packed config, resolves the self-relative page-0 offset, and opens
//! the backing file per the caller's [`RuntimeOptions`]. The data plane
//! (reading and writing user pages) lives above this layer; the recovered
//! handle exposes the device's identity and geometry plus its raw file.

use eyre::{bail, Result, WrapErr};
use uuid::Uuid;

use crate::error::{ErrorKind, StorageError};
use crate::file::{StdRawBlockFile, StorageFile};
use crate::format::{
    FileOffsetPtr, PackedPageDeviceConfig, MAX_PAGE_SIZE_LOG2, MIN_PAGE_SIZE_LOG2,
};

use super::{RecoverableConfig, RuntimeOptions};

/// A live page device backed by a storage file.
#[derive(Debug)]
pub struct PageDevice {
    file: StdRawBlockFile,
    uuid: Uuid,
    device_id: u64,
    page_count: u64,
    page_size_log2: u16,
    page_0_offset: u64,
}

impl PageDevice {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn page_size_log2(&self) -> u16 {
        self.page_size_log2
    }

    pub fn page_size(&self) -> u64 {
        1u64 << self.page_size_log2
    }

    /// Absolute file offset of page 0.
    pub fn page_0_offset(&self) -> u64 {
        self.page_0_offset
    }

    /// Absolute file offset of page `page_no`.
    pub fn page_offset(&self, page_no: u64) -> Result<u64> {
        if page_no >= self.page_count {
            bail!(StorageError::new(
                ErrorKind::OutOfRange,
                format!(
                    "page {} out of bounds for device {} (page_count = {})",
                    page_no, self.device_id, self.page_count
                ),
            ));
        }
        Ok(self.page_0_offset + page_no * self.page_size())
    }

    /// The raw file backing this device.
    pub fn raw_file(&mut self) -> &mut StdRawBlockFile {
        &mut self.file
    }
}

impl RecoverableConfig for PackedPageDeviceConfig {
    type LiveObject = PageDevice;

    fn recover(
        config: FileOffsetPtr<'_, Self>,
        file: &StorageFile,
        options: &RuntimeOptions,
    ) -> Result<PageDevice> {
        if !(MIN_PAGE_SIZE_LOG2..=MAX_PAGE_SIZE_LOG2).contains(&config.page_size_log2()) {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "recovered page_size_log2 {} outside [{}, {}]",
                    config.page_size_log2(),
                    MIN_PAGE_SIZE_LOG2,
                    MAX_PAGE_SIZE_LOG2
                ),
            ));
        }
        if config.page_count() < 1 {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                "recovered page device owns no pages",
            ));
        }

        let Some(page_0_offset) = config.resolve(config.page_0_offset()) else {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "page_0_offset {} of slot at {} leaves the addressable range",
                    config.page_0_offset(),
                    config.file_offset()
                ),
            ));
        };
        if page_0_offset % config.page_size() != 0 {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "page 0 at offset {} is not aligned to the {}-byte page size",
                    page_0_offset,
                    config.page_size()
                ),
            ));
        }

        let raw = StdRawBlockFile::open(file.path(), options.read_only).wrap_err_with(|| {
            format!(
                "failed to open backing file for page device {}",
                config.uuid()
            )
        })?;

        Ok(PageDevice {
            file: raw,
            uuid: config.uuid(),
            device_id: config.device_id(),
            page_count: config.page_count(),
            page_size_log2: config.page_size_log2(),
            page_0_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(dir: &tempfile::TempDir, page_count: u64, page_size_log2: u16) -> PageDevice {
        PageDevice {
            file: StdRawBlockFile::create(dir.path().join("pages")).unwrap(),
            uuid: Uuid::new_v4(),
            device_id: 3,
            page_count,
            page_size_log2,
            page_0_offset: 8192,
        }
    }

    #[test]
    fn page_offsets_are_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir, 4, 12);

        assert_eq!(device.page_offset(0).unwrap(), 8192);
        assert_eq!(device.page_offset(1).unwrap(), 12288);
        assert_eq!(device.page_offset(3).unwrap(), 8192 + 3 * 4096);
    }

    #[test]
    fn out_of_bounds_page_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir, 4, 12);

        let err = device.page_offset(4).unwrap_err();
        assert_eq!(
            crate::error::storage_error_kind(&err),
            Some(ErrorKind::OutOfRange)
        );
    }

    #[test]
    fn geometry_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir, 10, 9);

        assert_eq!(device.page_size(), 512);
        assert_eq!(device.page_size_log2(), 9);
        assert_eq!(device.page_count(), 10);
        assert_eq!(device.device_id(), 3);
    }
}
