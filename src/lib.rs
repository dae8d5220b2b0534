//! # strata — Storage-File Bootstrap Layer
//!
//! strata is the bootstrap layer of a log-structured storage substrate: it
//! lays out a raw block device (or file) into a chain of *configuration
//! blocks*, each enumerating *storage objects* (page devices, and future
//! kinds) that upper layers recover and use.
//!
//! Every byte placement is deliberate — alignment rounding, self-relative
//! back-references, chain links — because a reader on a different build must
//! reconstruct the same object graph from the bytes alone.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata::{
//!     read_storage_file, PackedPageDeviceConfig, PageDeviceConfigOptions,
//!     RuntimeOptions, StdRawBlockFile, StorageContext, StorageFile,
//!     StorageFileBuilder,
//! };
//!
//! // Build: declare objects, then flush the plan.
//! let mut file = StdRawBlockFile::create("/data/store")?;
//! let mut builder = StorageFileBuilder::new(&mut file, 0);
//! let config = builder.add_object(PageDeviceConfigOptions {
//!     uuid: None,
//!     device_id: None,
//!     page_count: 1024,
//!     page_size_log2: 12,
//! })?;
//! let uuid = config.uuid();
//! builder.flush_all()?;
//!
//! // Recover: walk the chain, index the slots, get a live device.
//! let blocks = read_storage_file(&mut file, 0)?;
//! let storage_file = Arc::new(StorageFile::new("/data/store", blocks));
//! let context = StorageContext::new();
//! context.add_existing_file(storage_file)?;
//! let device = context
//!     .recover_object::<PackedPageDeviceConfig>(&uuid, &RuntimeOptions::default())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------+
//! |  recovery: StorageContext, PageDevice    |   typed recovery by (tag, uuid)
//! +------------------------------------------+
//! |  file: StorageFileBuilder, reader,       |   planning, flushing, chain
//! |        StorageFile, RawBlockFile seam    |   walking
//! +------------------------------------------+
//! |  format: PackedConfigBlock, slots,       |   bit-exact on-disk records,
//! |          PackedBytes, FileOffsetPtr      |   CRC-64, self-relative links
//! +------------------------------------------+
//! ```
//!
//! ## Module Overview
//!
//! - [`format`]: on-disk records and primitives (little-endian scalars,
//!   slots, blocks, CRC)
//! - [`file`]: the `RawBlockFile` seam, the builder, the chain reader
//! - [`recovery`]: the process-wide context and live-object recovery
//! - [`error`]: observable error kinds carried through `eyre` reports

#[macro_use]
mod macros;

pub mod error;
pub mod file;
pub mod format;
pub mod recovery;

pub use error::{storage_error_kind, ErrorKind, StorageError};
pub use file::{
    read_storage_file, PageDeviceConfigOptions, RawBlockFile, StdRawBlockFile, StorageFile,
    StorageFileBuilder, StorageFileConfigBlock, FAST_PAGE_DEVICE_INIT, PAGE_INIT_SECTOR_SIZE,
};
pub use format::{
    config_slot_cast, make_version_u64, pack_bytes, packed_sizeof_str, packed_sizeof_str_data,
    round_up_bits, unpack_bytes, ConfigPayload, FileOffsetPtr, PackedBytes, PackedConfigBlock,
    PackedConfigSlot, PackedPageDeviceConfig, SlotTag, CONFIG_BLOCK_MAGIC, CONFIG_BLOCK_SIZE,
    CONFIG_BLOCK_VERSION, CONFIG_SLOT_SIZE, NULL_FILE_OFFSET, SLOTS_PER_BLOCK,
};
pub use recovery::{PageDevice, RecoverableConfig, RuntimeOptions, StorageContext};
