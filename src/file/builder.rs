//! # StorageFileBuilder
//!
//! Lays out a new storage file: callers declare objects, the builder plans a
//! slot and the data regions each object owns, and `flush_all` writes the
//! whole plan through the [`RawBlockFile`].
//!
//! ## Planning Model
//!
//! Nothing touches the file until `flush_all`. The builder keeps:
//!
//! - a list of pending config-block images, built in place on the heap;
//! - a list of pending page regions to zero-initialize at flush time;
//! - a write cursor tracking the end of the planned file.
//!
//! The first block is placed at `round_up(base_offset, 4096)` when the first
//! object is added; the cursor then starts just past that block. Each page
//! device's page 0 lands at `round_up(cursor, page_size)`. When a block's 62
//! slots fill up, the next block opens at `round_up(cursor, 4096)` — after
//! the previous block's page data — and the chain links are fixed there and
//! then, as self-relative distances.
//!
//! ## Flush Ordering
//!
//! `flush_all` performs, in a strict observable order:
//!
//! 1. `truncate_at_least(final_file_size)`;
//! 2. unless [`FAST_PAGE_DEVICE_INIT`], one 512-byte zero write per page of
//!    every declared device (always past the owning block's offset);
//! 3. each config block, in forward chain order, CRC stamped last.
//!
//! Partial writes are retried; the first error aborts the flush and leaves
//! the file partially written. Recovery from a half-built file is the
//! caller's policy.
//!
//! A builder is single-use: `flush_all` consumes it. Dropping a builder
//! without flushing abandons the plan without performing any I/O.

use eyre::{bail, Result, WrapErr};
use hashbrown::HashSet;
use uuid::Uuid;
use zerocopy::IntoBytes;

use crate::error::{ErrorKind, StorageError};
use crate::format::{
    config_slot_cast, config_slot_cast_mut, ConfigPayload, FileOffsetPtr, PackedConfigBlock,
    PackedPageDeviceConfig, CONFIG_BLOCK_ALIGN_LOG2, CONFIG_BLOCK_HEADER_SIZE, CONFIG_BLOCK_SIZE,
    CONFIG_SLOT_SIZE, MAX_PAGE_SIZE_LOG2, MIN_PAGE_SIZE_LOG2,
};

use super::{RawBlockFile, FAST_PAGE_DEVICE_INIT, PAGE_INIT_SECTOR_SIZE};

/// Options for declaring one page device.
///
/// Absent `uuid` and `device_id` are filled in by the builder: a fresh v4
/// UUID, and the next densely-assigned id. An explicit `device_id` must be
/// unique within the storage file.
#[derive(Debug, Clone, Default)]
pub struct PageDeviceConfigOptions {
    pub uuid: Option<Uuid>,
    pub device_id: Option<u64>,
    pub page_count: u64,
    pub page_size_log2: u16,
}

struct PendingBlock {
    file_offset: u64,
    image: Box<PackedConfigBlock>,
}

struct PendingPageRegion {
    page_0_offset: u64,
    page_count: u64,
    page_size: u64,
}

pub struct StorageFileBuilder<'a, F: RawBlockFile> {
    file: &'a mut F,
    base_offset: u64,
    blocks: Vec<PendingBlock>,
    regions: Vec<PendingPageRegion>,
    next_device_id: u64,
    device_ids: HashSet<u64>,
    cursor: u64,
}

impl<'a, F: RawBlockFile> StorageFileBuilder<'a, F> {
    /// Starts a plan for a storage file whose config-block chain begins at
    /// `base_offset` (rounded up to the 4 KiB block alignment). Performs no
    /// I/O.
    pub fn new(file: &'a mut F, base_offset: u64) -> Self {
        Self {
            file,
            base_offset,
            blocks: Vec::new(),
            regions: Vec::new(),
            next_device_id: 0,
            device_ids: HashSet::new(),
            cursor: 0,
        }
    }

    /// Plans one page device: reserves a slot, assigns the device's page
    /// array a file region past the config blocks, and fills the slot image
    /// in place. Returns a view of the yet-unwritten slot together with its
    /// future file offset.
    pub fn add_object(
        &mut self,
        options: PageDeviceConfigOptions,
    ) -> Result<FileOffsetPtr<'_, PackedPageDeviceConfig>> {
        if options.page_count < 1 {
            bail!(StorageError::new(
                ErrorKind::InvalidArgument,
                "page device must own at least one page",
            ));
        }
        if !(MIN_PAGE_SIZE_LOG2..=MAX_PAGE_SIZE_LOG2).contains(&options.page_size_log2) {
            bail!(StorageError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "page_size_log2 {} outside [{}, {}]",
                    options.page_size_log2, MIN_PAGE_SIZE_LOG2, MAX_PAGE_SIZE_LOG2
                ),
            ));
        }
        // Device ids are unique within the storage file. Auto-assigned ids
        // cannot collide (next_device_id stays past every assigned id), so
        // only an explicit id needs the check.
        if let Some(id) = options.device_id {
            if self.device_ids.contains(&id) {
                bail!(StorageError::new(
                    ErrorKind::InvalidArgument,
                    format!("device_id {} is already assigned in this storage file", id),
                ));
            }
        }

        self.ensure_open_slot()?;

        let block_index = self.blocks.len() - 1;
        let block_offset = self.blocks[block_index].file_offset;
        let slot_index = self.blocks[block_index].image.slot_count() as usize;
        let slot_offset =
            block_offset + (CONFIG_BLOCK_HEADER_SIZE + slot_index * CONFIG_SLOT_SIZE) as u64;

        let page_size = 1u64 << options.page_size_log2;
        let page_0_offset = checked_round_up(self.cursor, options.page_size_log2 as u32)?;
        let device_size = options
            .page_count
            .checked_mul(page_size)
            .ok_or_else(device_region_overflow)?;
        let new_cursor = page_0_offset
            .checked_add(device_size)
            .filter(|end| *end <= i64::MAX as u64)
            .ok_or_else(device_region_overflow)?;

        let uuid = options.uuid.unwrap_or_else(Uuid::new_v4);
        let device_id = match options.device_id {
            Some(id) => {
                if let Some(bumped) = id.checked_add(1) {
                    self.next_device_id = self.next_device_id.max(bumped);
                }
                id
            }
            None => {
                let id = self.next_device_id;
                self.next_device_id += 1;
                id
            }
        };
        self.device_ids.insert(device_id);

        let pending = &mut self.blocks[block_index];
        let slot = pending.image.slot_mut(slot_index);
        slot.set_tag(PackedPageDeviceConfig::TAG);

        let config = config_slot_cast_mut::<PackedPageDeviceConfig>(slot)?;
        config.set_uuid(uuid);
        config.set_device_id(device_id);
        config.set_page_count(options.page_count);
        config.set_page_size_log2(options.page_size_log2);
        config.set_page_0_offset(page_0_offset as i64 - slot_offset as i64);

        pending.image.set_slot_count((slot_index + 1) as u16);

        self.cursor = new_cursor;
        self.regions.push(PendingPageRegion {
            page_0_offset,
            page_count: options.page_count,
            page_size,
        });

        let config = config_slot_cast::<PackedPageDeviceConfig>(
            &self.blocks[block_index].image.slots()[slot_index],
        )?;
        Ok(FileOffsetPtr::new(slot_offset, config))
    }

    /// Writes the plan: truncate, page-array initialization, then the config
    /// blocks in forward chain order. A plan with no objects is a no-op.
    pub fn flush_all(mut self) -> Result<()> {
        if self.blocks.is_empty() {
            return Ok(());
        }

        self.file
            .truncate_at_least(self.cursor)
            .wrap_err("failed to grow storage file to its planned size")?;

        if !FAST_PAGE_DEVICE_INIT {
            let zeros = [0u8; PAGE_INIT_SECTOR_SIZE];
            for region in &self.regions {
                let mut offset = region.page_0_offset;
                for _ in 0..region.page_count {
                    self.file.write_all(offset, &zeros).wrap_err_with(|| {
                        format!("failed to initialize page sector at offset {}", offset)
                    })?;
                    offset += region.page_size;
                }
            }
        }

        for pending in &mut self.blocks {
            pending.image.update_crc64();
            self.file
                .write_all(pending.file_offset, pending.image.as_bytes())
                .wrap_err_with(|| {
                    format!("failed to write config block at offset {}", pending.file_offset)
                })?;
        }

        Ok(())
    }

    /// Makes sure the newest block has a free slot, opening the first block
    /// or chaining a new one as needed.
    fn ensure_open_slot(&mut self) -> Result<()> {
        if self.blocks.is_empty() {
            let file_offset = checked_round_up(self.base_offset, CONFIG_BLOCK_ALIGN_LOG2)?;
            self.cursor = file_offset
                .checked_add(CONFIG_BLOCK_SIZE as u64)
                .filter(|end| *end <= i64::MAX as u64)
                .ok_or_else(device_region_overflow)?;
            self.blocks.push(PendingBlock {
                file_offset,
                image: PackedConfigBlock::new_boxed()?,
            });
            return Ok(());
        }

        let last_index = self.blocks.len() - 1;
        if !self.blocks[last_index].image.is_full() {
            return Ok(());
        }

        let file_offset = checked_round_up(self.cursor, CONFIG_BLOCK_ALIGN_LOG2)?;
        self.cursor = file_offset
            .checked_add(CONFIG_BLOCK_SIZE as u64)
            .filter(|end| *end <= i64::MAX as u64)
            .ok_or_else(device_region_overflow)?;

        let mut image = PackedConfigBlock::new_boxed()?;
        let distance = (file_offset - self.blocks[last_index].file_offset) as i64;
        self.blocks[last_index].image.set_next_offset(distance);
        image.set_prev_offset(-distance);

        self.blocks.push(PendingBlock { file_offset, image });
        Ok(())
    }
}

fn checked_round_up(value: u64, bits: u32) -> Result<u64> {
    let mask = (1u64 << bits) - 1;
    value
        .checked_add(mask)
        .map(|v| v & !mask)
        .filter(|v| *v <= i64::MAX as u64)
        .ok_or_else(|| {
            eyre::Report::new(StorageError::new(
                ErrorKind::OutOfRange,
                format!("offset {} cannot be aligned to 1 << {}", value, bits),
            ))
        })
}

fn device_region_overflow() -> eyre::Report {
    eyre::Report::new(StorageError::new(
        ErrorKind::OutOfRange,
        "planned file layout exceeds the addressable range",
    ))
}
