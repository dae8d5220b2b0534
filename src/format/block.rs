//! # Configuration Blocks
//!
//! A configuration block is the fixed 4096-byte unit of the storage-file
//! bootstrap chain. Blocks are doubly linked through *self-relative* signed
//! offsets and protected by a trailing CRC-64, so a reader on any build can
//! reconstruct the object graph from the bytes alone.
//!
//! ## Block Layout (4096 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  -----------------------------------------
//! 0       8     magic        CONFIG_BLOCK_MAGIC
//! 8       8     version      make_version_u64(major, minor, patch)
//! 16      8     prev_offset  Distance to the previous block's start,
//!                            or NULL_FILE_OFFSET at the chain head
//! 24      8     next_offset  Distance to the next block's start,
//!                            or NULL_FILE_OFFSET at the chain tail
//! 32      2     slot_count   Occupied slots, at most 62
//! 34      30    (padding)    Header area padded to 64 bytes
//! 64      3968  slots        PackedConfigSlot[62]; unused slots zeroed
//! 4032    56    (padding)
//! 4088    8     crc64        CRC-64 over the block, CRC field as zero
//! ```
//!
//! ## Chain Invariants
//!
//! For adjacent blocks A -> B: `A.next_offset == offset(B) - offset(A)` and
//! `B.prev_offset == -A.next_offset`. The head's `prev_offset` and the
//! tail's `next_offset` are `NULL_FILE_OFFSET`.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{bail, Result};
use zerocopy::little_endian::{I64, U16, U64};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{ErrorKind, StorageError};

use super::{
    make_version_u64, PackedConfigSlot, CONFIG_BLOCK_HEADER_SIZE, CONFIG_BLOCK_PAYLOAD_CAPACITY,
    CONFIG_BLOCK_SIZE, SLOTS_PER_BLOCK,
};

pub const CONFIG_BLOCK_MAGIC: u64 = u64::from_le_bytes(*b"strataCB");
pub const CONFIG_BLOCK_VERSION: u64 = make_version_u64(0, 1, 0);

/// Sentinel link value meaning "no neighbor". `i64::MAX` can never be a
/// valid self-relative distance inside an addressable file, and is stable
/// across writers and readers.
pub const NULL_FILE_OFFSET: i64 = i64::MAX;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const HEADER_FIELDS_SIZE: usize = 8 + 8 + 8 + 8 + 2;
const HEADER_PAD: usize = CONFIG_BLOCK_HEADER_SIZE - HEADER_FIELDS_SIZE;
const SLOTS_END: usize = CONFIG_BLOCK_HEADER_SIZE + SLOTS_PER_BLOCK * 64;
const TAIL_PAD: usize = CONFIG_BLOCK_PAYLOAD_CAPACITY - SLOTS_END;

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PackedConfigBlock {
    magic: U64,
    version: U64,
    prev_offset: I64,
    next_offset: I64,
    slot_count: U16,
    header_pad: [u8; HEADER_PAD],
    slots: [PackedConfigSlot; SLOTS_PER_BLOCK],
    tail_pad: [u8; TAIL_PAD],
    crc64: U64,
}

const _: () = assert!(std::mem::size_of::<PackedConfigBlock>() == CONFIG_BLOCK_SIZE);

impl PackedConfigBlock {
    zerocopy_accessors! {
        magic: u64,
        version: u64,
        prev_offset: i64,
        next_offset: i64,
        slot_count: u16,
        crc64: u64,
    }

    /// Allocates a zeroed block image and stamps the identity fields. Links
    /// start out null; the caller chains blocks as the plan grows.
    pub fn new_boxed() -> Result<Box<Self>> {
        let mut block = Self::new_box_zeroed()
            .map_err(|_| eyre::eyre!("failed to allocate config block image"))?;
        block.set_magic(CONFIG_BLOCK_MAGIC);
        block.set_version(CONFIG_BLOCK_VERSION);
        block.set_prev_offset(NULL_FILE_OFFSET);
        block.set_next_offset(NULL_FILE_OFFSET);
        Ok(block)
    }

    /// The occupied slots, in declaration order.
    pub fn slots(&self) -> &[PackedConfigSlot] {
        let count = (self.slot_count.get() as usize).min(SLOTS_PER_BLOCK);
        &self.slots[..count]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut PackedConfigSlot {
        &mut self.slots[index]
    }

    pub fn is_full(&self) -> bool {
        self.slot_count.get() as usize >= SLOTS_PER_BLOCK
    }

    /// CRC-64 over the entire block with the CRC field treated as zero.
    pub fn true_crc64(&self) -> u64 {
        let mut digest = CRC64.digest();
        digest.update(&self.as_bytes()[..CONFIG_BLOCK_PAYLOAD_CAPACITY]);
        digest.update(&[0u8; 8]);
        digest.finalize()
    }

    pub fn update_crc64(&mut self) {
        let crc = self.true_crc64();
        self.set_crc64(crc);
    }

    /// Validates the identity and integrity fields of a block image read
    /// from disk. Chain topology is the reader's concern.
    pub fn validate(&self) -> Result<()> {
        if self.magic() != CONFIG_BLOCK_MAGIC {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!("bad config block magic {:#018x}", self.magic()),
            ));
        }
        if self.version() != CONFIG_BLOCK_VERSION {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!("unrecognized config block version {:#x}", self.version()),
            ));
        }
        if self.slot_count.get() as usize > SLOTS_PER_BLOCK {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!("config block slot count {} exceeds {}", self.slot_count.get(), SLOTS_PER_BLOCK),
            ));
        }
        let expected = self.true_crc64();
        if self.crc64() != expected {
            bail!(StorageError::new(
                ErrorKind::DataLoss,
                format!(
                    "config block crc mismatch: stored {:#018x}, computed {:#018x}",
                    self.crc64(),
                    expected
                ),
            ));
        }
        Ok(())
    }
}
