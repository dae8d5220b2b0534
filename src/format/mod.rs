//! # On-Disk Format Primitives
//!
//! This module defines the byte-level building blocks of a storage file:
//! fixed-width little-endian integers, the self-relative byte descriptor,
//! the tagged configuration slot, and the CRC-protected configuration block.
//!
//! ## Layout Overview
//!
//! A storage file begins with a chain of 4096-byte configuration blocks, each
//! enumerating up to 62 storage objects. The raw data regions owned by those
//! objects (e.g. the page array of a page device) follow the block that
//! declares them:
//!
//! ```text
//! [round_up(base_offset, 4096)]
//!   +----------------- PackedConfigBlock #0 (4096 B) ------------------+
//!   | magic:u64 | version:u64 | prev:i64 | next:i64 | slot_count:u16   |
//!   | ... header padded to 64 bytes ...                                |
//!   | slots: PackedConfigSlot[62]   (64 B each)                        |
//!   | ... zero padding ...                                             |
//!   | crc64:u64                                                        |
//!   +------------------------------------------------------------------+
//! [round_up(end_of_block, page_size_0)]
//!   page arrays for the devices declared in block #0
//! [round_up(..., 4096)]  PackedConfigBlock #1, and so on.
//! ```
//!
//! ## Endianness and Zero-Copy Access
//!
//! All multi-byte on-disk integers are little-endian, realized with the
//! `zerocopy::little_endian` wrapper types plus the crate-local [`U24`].
//! Every packed struct is `#[repr(C)]`, derives the zerocopy transmutation
//! traits, and is compile-time size-asserted, so records can be read directly
//! out of I/O buffers without copying.
//!
//! ## Self-Relative Offsets
//!
//! Link fields (`prev_offset`, `next_offset`, `page_0_offset`) are signed
//! distances from the *record that holds them*, never absolute positions.
//! This keeps blocks position-independent: the bytes mean the same thing no
//! matter where the chain starts in the file. The in-memory counterpart is
//! [`FileOffsetPtr`], which pairs a borrowed record view with its absolute
//! file offset so that resolving a self-relative field is explicit.
//!
//! ## Constant Dependencies
//!
//! ```text
//! CONFIG_BLOCK_SIZE (4096)
//!       |
//!       +-> CONFIG_BLOCK_HEADER_SIZE (64)
//!       +-> CONFIG_BLOCK_PAYLOAD_CAPACITY (4096 - 8, i.e. everything but crc64)
//!       +-> SLOTS_PER_BLOCK (62)   62 * 64 + 64 + 8 <= 4096
//!
//! CONFIG_SLOT_SIZE (64)
//!       +-> every ConfigPayload type is exactly this size
//! ```

mod block;
mod bytes;
mod ptr;
mod slot;

pub use block::{
    PackedConfigBlock, CONFIG_BLOCK_MAGIC, CONFIG_BLOCK_VERSION, NULL_FILE_OFFSET,
};
pub use bytes::{
    pack_bytes, packed_sizeof_str, packed_sizeof_str_data, unpack_bytes, PackedBytes,
};
pub use ptr::FileOffsetPtr;
pub use slot::{
    config_slot_cast, config_slot_cast_mut, ConfigPayload, PackedConfigSlot,
    PackedPageDeviceConfig, SlotTag,
};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const CONFIG_BLOCK_SIZE: usize = 4096;
pub const CONFIG_BLOCK_HEADER_SIZE: usize = 64;
pub const CONFIG_BLOCK_PAYLOAD_CAPACITY: usize = CONFIG_BLOCK_SIZE - 8;
pub const CONFIG_SLOT_SIZE: usize = 64;
pub const SLOTS_PER_BLOCK: usize = 62;

/// Config blocks are placed on 4 KiB boundaries.
pub const CONFIG_BLOCK_ALIGN_LOG2: u32 = 12;

pub const MIN_PAGE_SIZE_LOG2: u16 = 9;
pub const MAX_PAGE_SIZE_LOG2: u16 = 24;

const _: () = assert!(CONFIG_BLOCK_PAYLOAD_CAPACITY + 8 == CONFIG_BLOCK_SIZE);
const _: () = assert!(
    CONFIG_BLOCK_HEADER_SIZE + SLOTS_PER_BLOCK * CONFIG_SLOT_SIZE + 8 <= CONFIG_BLOCK_SIZE
);

/// Rounds `value` up to the next multiple of `1 << bits`.
#[inline]
pub fn round_up_bits(bits: u32, value: u64) -> u64 {
    let mask = (1u64 << bits) - 1;
    (value + mask) & !mask
}

/// Packs a semantic version into the on-disk `u64` representation.
#[inline]
pub const fn make_version_u64(major: u64, minor: u64, patch: u64) -> u64 {
    (major << 32) | (minor << 16) | patch
}

/// A 3-byte little-endian unsigned integer, alignment 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct U24([u8; 3]);

impl U24 {
    pub const MAX_VALUE: u32 = (1 << 24) - 1;

    #[inline]
    pub fn new(value: u32) -> Self {
        debug_assert!(value <= Self::MAX_VALUE);
        let b = value.to_le_bytes();
        Self([b[0], b[1], b[2]])
    }

    #[inline]
    pub fn get(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], 0])
    }
}

/// Parses a zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_packed<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// Parses a mutable zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_packed_mut<'a, T: FromBytes + KnownLayout + IntoBytes>(
    bytes: &'a mut [u8],
    type_name: &str,
) -> Result<&'a mut T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u24_roundtrip() {
        for value in [0u32, 1, 255, 256, 65535, 65536, U24::MAX_VALUE] {
            assert_eq!(U24::new(value).get(), value);
        }
    }

    #[test]
    fn u24_is_little_endian() {
        let v = U24::new(0x0301_02);
        assert_eq!(v.as_bytes(), &[0x02, 0x01, 0x03]);
    }

    #[test]
    fn round_up_bits_basics() {
        assert_eq!(round_up_bits(12, 0), 0);
        assert_eq!(round_up_bits(12, 1), 4096);
        assert_eq!(round_up_bits(12, 4096), 4096);
        assert_eq!(round_up_bits(12, 4097), 8192);
        assert_eq!(round_up_bits(9, 128), 512);
        assert_eq!(round_up_bits(9, 65536), 65536);
    }

    #[test]
    fn version_packing() {
        assert_eq!(make_version_u64(0, 1, 0), 0x1_0000);
        assert_eq!(make_version_u64(1, 2, 3), (1 << 32) | (2 << 16) | 3);
    }
}
