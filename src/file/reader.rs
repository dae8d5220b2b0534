//! # Chain Reader
//!
//! Walks a storage file's config-block chain from its head, validating each
//! block before exposing any view of it, and returns owned block images in
//! forward order. A failing block aborts the whole read: partial chains are
//! never handed to callers.

use eyre::{bail, Result, WrapErr};
use hashbrown::HashSet;
use zerocopy::{FromZeros, IntoBytes};

use crate::error::{ErrorKind, StorageError};
use crate::format::{
    round_up_bits, PackedConfigBlock, CONFIG_BLOCK_ALIGN_LOG2, NULL_FILE_OFFSET,
};

use super::RawBlockFile;

/// One config block read back from a storage file: the owned 4096-byte image
/// plus the absolute offset it was read from. Slot views borrow from the
/// image and are never copied out of it.
#[derive(Debug)]
pub struct StorageFileConfigBlock {
    file_offset: u64,
    block: Box<PackedConfigBlock>,
}

impl StorageFileConfigBlock {
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    pub fn block(&self) -> &PackedConfigBlock {
        &self.block
    }
}

/// Reads the config-block chain starting at `round_up(start_offset, 4096)`.
///
/// The block at the start offset must be the chain head (its `prev_offset`
/// is null); callers holding an offset into the middle of a chain are
/// responsible for following `prev` links first. Any integrity failure —
/// bad magic, unrecognized version, CRC mismatch, a link leaving the
/// addressable range, or a cycle — fails the whole read with `DataLoss`.
pub fn read_storage_file<F: RawBlockFile>(
    file: &mut F,
    start_offset: u64,
) -> Result<Vec<StorageFileConfigBlock>> {
    let mut offset = round_up_bits(CONFIG_BLOCK_ALIGN_LOG2, start_offset);
    let mut seen: HashSet<u64> = HashSet::new();
    let mut blocks = Vec::new();

    loop {
        if !seen.insert(offset) {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!("config block chain revisits offset {}", offset),
            ));
        }

        let mut image = PackedConfigBlock::new_box_zeroed()
            .map_err(|_| eyre::eyre!("failed to allocate config block image"))?;
        file.read_all(offset, image.as_mut_bytes())
            .wrap_err_with(|| format!("failed to read config block at offset {}", offset))?;

        image
            .validate()
            .wrap_err_with(|| format!("config block at offset {} failed validation", offset))?;

        if blocks.is_empty() && image.prev_offset() != NULL_FILE_OFFSET {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "config block at offset {} is not a chain head (prev_offset = {})",
                    offset,
                    image.prev_offset()
                ),
            ));
        }

        let next = image.next_offset();
        blocks.push(StorageFileConfigBlock {
            file_offset: offset,
            block: image,
        });

        if next == NULL_FILE_OFFSET {
            return Ok(blocks);
        }

        let Some(next_offset) = (offset as i64)
            .checked_add(next)
            .and_then(|v| u64::try_from(v).ok())
        else {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "next_offset {} from config block at {} leaves the addressable range",
                    next, offset
                ),
            ));
        };
        offset = next_offset;
    }
}
