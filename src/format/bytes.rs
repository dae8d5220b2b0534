//! # PackedBytes
//!
//! An 8-byte self-relative descriptor for a variable-length byte string.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ------------------------------------------
//! 0       3     data_offset  Bytes from the start of this record to the
//!                            first data byte
//! 3       1     (unused)
//! 4       3     data_size    Size in bytes; MAY BE INVALID, see below
//! 7       1     (reserved)
//! ```
//!
//! ## Inline vs External Form
//!
//! If `data_offset < 8`, the data occupies bytes `[data_offset, 8)` of the
//! record itself and `data_size` is ignored; the length is
//! `8 - data_offset`. This lets payloads of up to 4 bytes fit entirely
//! inside the record. A zero-length payload cannot be expressed inline
//! (an inline length is at least 1), so it is packed in external form with
//! `data_offset == 8` and `data_size == 0`.
//!
//! Otherwise `data_offset >= 8` and `data_size` is authoritative; the data
//! lies at `[record + data_offset, record + data_offset + data_size)`.
//!
//! ## In-Situ Addressing
//!
//! Because `data_offset` is relative to the record's own position, a
//! `PackedBytes` must never be relocated after construction. The type is
//! deliberately not `Clone`; records live inside an enclosing buffer and
//! all access goes through [`pack_bytes`] / [`unpack_bytes`], which take
//! the buffer and the record's position within it.

use eyre::{bail, ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{ErrorKind, StorageError};

use super::{parse_packed, parse_packed_mut, U24};

pub const PACKED_BYTES_SIZE: usize = 8;

/// Longest payload that still fits inside the record itself.
pub const PACKED_BYTES_INLINE_MAX: usize = 4;

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PackedBytes {
    data_offset: U24,
    unused: [u8; 1],
    data_size: U24,
    reserved: [u8; 1],
}

const _: () = assert!(std::mem::size_of::<PackedBytes>() == PACKED_BYTES_SIZE);

impl PackedBytes {
    #[inline]
    pub fn data_offset(&self) -> u32 {
        self.data_offset.get()
    }

    #[inline]
    pub fn is_inline(&self) -> bool {
        (self.data_offset.get() as usize) < PACKED_BYTES_SIZE
    }

    /// The payload length. Always use this instead of reading `data_size`
    /// directly; the size field is invalid in the inline form.
    #[inline]
    pub fn len(&self) -> usize {
        let offset = self.data_offset.get() as usize;
        if offset < PACKED_BYTES_SIZE {
            PACKED_BYTES_SIZE - offset
        } else {
            self.data_size.get() as usize
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn packed_sizeof_str_data(len: usize) -> usize {
    if len <= PACKED_BYTES_INLINE_MAX {
        return 0;
    }
    len
}

pub fn packed_sizeof_str(len: usize) -> usize {
    PACKED_BYTES_SIZE + packed_sizeof_str_data(len)
}

/// Writes a `PackedBytes` record at `buf[pos..]` describing `data`, placing
/// external payloads immediately after the record. Returns the total number
/// of bytes consumed starting at `pos` (i.e. `packed_sizeof_str(data.len())`).
pub fn pack_bytes(buf: &mut [u8], pos: usize, data: &[u8]) -> Result<usize> {
    if data.len() > U24::MAX_VALUE as usize {
        bail!(StorageError::new(
            ErrorKind::InvalidArgument,
            format!("payload of {} bytes exceeds the 24-bit size field", data.len()),
        ));
    }

    let needed = packed_sizeof_str(data.len());
    ensure!(
        pos.checked_add(needed).map_or(false, |end| end <= buf.len()),
        "buffer too small for PackedBytes at {}: need {}, have {}",
        pos,
        needed,
        buf.len().saturating_sub(pos)
    );

    let (record_bytes, tail) = buf[pos..].split_at_mut(PACKED_BYTES_SIZE);

    if (1..=PACKED_BYTES_INLINE_MAX).contains(&data.len()) {
        let offset = PACKED_BYTES_SIZE - data.len();
        record_bytes[..offset].fill(0);
        record_bytes[offset..].copy_from_slice(data);

        let record = parse_packed_mut::<PackedBytes>(record_bytes, "PackedBytes")?;
        record.data_offset = U24::new(offset as u32);
    } else {
        let record = parse_packed_mut::<PackedBytes>(record_bytes, "PackedBytes")?;
        record.data_offset = U24::new(PACKED_BYTES_SIZE as u32);
        record.unused = [0];
        record.data_size = U24::new(data.len() as u32);
        record.reserved = [0];

        tail[..data.len()].copy_from_slice(data);
    }

    Ok(needed)
}

/// Resolves the payload described by the `PackedBytes` record at `buf[pos..]`.
/// The returned slice borrows from `buf`; the record is never copied.
pub fn unpack_bytes(buf: &[u8], pos: usize) -> Result<&[u8]> {
    ensure!(
        pos.checked_add(PACKED_BYTES_SIZE)
            .map_or(false, |end| end <= buf.len()),
        "buffer too small for PackedBytes record at {}",
        pos
    );

    let record = parse_packed::<PackedBytes>(&buf[pos..], "PackedBytes")?;
    let offset = record.data_offset() as usize;
    let len = record.len();

    let Some(start) = pos.checked_add(offset) else {
        bail!(StorageError::new(
            ErrorKind::DataLoss,
            format!("PackedBytes data offset {} overflows", offset),
        ));
    };

    if start.checked_add(len).map_or(true, |end| end > buf.len()) {
        bail!(StorageError::new(
            ErrorKind::DataLoss,
            format!(
                "PackedBytes data [{}, {}+{}) extends beyond buffer of {} bytes",
                start,
                start,
                len,
                buf.len()
            ),
        ));
    }

    Ok(&buf[start..start + len])
}
