//! # Configuration Slots
//!
//! Every storage object declared in a storage file occupies one 64-byte
//! tagged slot inside a configuration block. The leading `u16` tag selects
//! the payload interpretation; the remaining 62 bytes are the payload arena.
//!
//! ## Slot Layout (64 bytes)
//!
//! ```text
//! Offset  Size  Field     Description
//! ------  ----  --------  -------------------------------------
//! 0       2     tag       Object kind (SlotTag)
//! 2       62    payload   Interpreted per tag; zero when unused
//! ```
//!
//! ## Typed Access
//!
//! A payload type implements [`ConfigPayload`], declaring its tag. Payload
//! structs span the whole slot (the tag is their first field), so a typed
//! view is obtained by reinterpreting the slot bytes in place with
//! [`config_slot_cast`]; nothing is copied and self-relative offset fields
//! keep their meaning. Adding a new object kind is additive: a new
//! [`SlotTag`] value plus a new `ConfigPayload` impl.
//!
//! ## Page Device Payload
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  ---------------------------------------
//! 0       2     tag             == SlotTag::PageDevice
//! 2       16    uuid            Device identity
//! 18      8     device_id       Densely-assigned id, unique per file
//! 26      8     page_count      Number of pages the device owns
//! 34      2     page_size_log2  Page size is 1 << page_size_log2
//! 36      8     page_0_offset   Signed distance from the start of this
//!                               slot to the first byte of page 0
//! 44      20    (reserved)
//! ```

use eyre::{ensure, Result};
use uuid::Uuid;
use zerocopy::little_endian::{I64, U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::CONFIG_SLOT_SIZE;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTag {
    Unknown = 0,
    PageDevice = 1,
    Volume = 2,
    PageArena = 3,
}

impl SlotTag {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => SlotTag::PageDevice,
            2 => SlotTag::Volume,
            3 => SlotTag::PageArena,
            _ => SlotTag::Unknown,
        }
    }
}

/// A slot-sized packed struct that interprets a slot's bytes for one tag.
///
/// Implementors span the entire 64-byte slot, with the tag as their first
/// field, and assert their size at compile time.
pub trait ConfigPayload: FromBytes + IntoBytes + Immutable + KnownLayout + Unaligned {
    const TAG: u16;
}

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PackedConfigSlot {
    tag: U16,
    payload: [u8; CONFIG_SLOT_SIZE - 2],
}

const _: () = assert!(std::mem::size_of::<PackedConfigSlot>() == CONFIG_SLOT_SIZE);

impl PackedConfigSlot {
    #[inline]
    pub fn tag(&self) -> u16 {
        self.tag.get()
    }

    #[inline]
    pub fn set_tag(&mut self, tag: u16) {
        self.tag = U16::new(tag);
    }

    #[inline]
    pub fn slot_tag(&self) -> SlotTag {
        SlotTag::from_u16(self.tag.get())
    }
}

/// Reinterprets a slot as the payload type for its tag, in place.
pub fn config_slot_cast<T: ConfigPayload>(slot: &PackedConfigSlot) -> Result<&T> {
    ensure!(
        slot.tag() == T::TAG,
        "config slot tag mismatch: expected {}, found {}",
        T::TAG,
        slot.tag()
    );
    T::ref_from_bytes(slot.as_bytes())
        .map_err(|e| eyre::eyre!("failed to cast config slot: {:?}", e))
}

/// Mutable counterpart of [`config_slot_cast`]; the tag must already be set.
pub fn config_slot_cast_mut<T: ConfigPayload>(slot: &mut PackedConfigSlot) -> Result<&mut T> {
    ensure!(
        slot.tag() == T::TAG,
        "config slot tag mismatch: expected {}, found {}",
        T::TAG,
        slot.tag()
    );
    T::mut_from_bytes(slot.as_mut_bytes())
        .map_err(|e| eyre::eyre!("failed to cast config slot: {:?}", e))
}

#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PackedPageDeviceConfig {
    tag: U16,
    uuid: [u8; 16],
    device_id: U64,
    page_count: U64,
    page_size_log2: U16,
    page_0_offset: I64,
    reserved: [u8; 20],
}

const _: () = assert!(std::mem::size_of::<PackedPageDeviceConfig>() == CONFIG_SLOT_SIZE);

impl ConfigPayload for PackedPageDeviceConfig {
    const TAG: u16 = SlotTag::PageDevice as u16;
}

impl PackedPageDeviceConfig {
    zerocopy_accessors! {
        device_id: u64,
        page_count: u64,
        page_size_log2: u16,
        page_0_offset: i64,
    }

    #[inline]
    pub fn tag(&self) -> u16 {
        self.tag.get()
    }

    #[inline]
    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.uuid)
    }

    #[inline]
    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = *uuid.as_bytes();
    }

    /// Page size in bytes.
    #[inline]
    pub fn page_size(&self) -> u64 {
        1u64 << self.page_size_log2.get()
    }
}
