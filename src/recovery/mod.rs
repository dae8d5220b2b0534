//! # Typed Recovery
//!
//! After a storage file's config blocks have been read back, this module
//! turns slots into live objects. [`StorageContext`] is the process-wide
//! registry: it indexes every slot of every added file by `(tag, uuid)` and
//! dispatches recovery requests to the payload type's recovery function.
//!
//! ## Registry Model
//!
//! The slot tag selects among a closed set of payload kinds. Dispatch is
//! through the [`RecoverableConfig`] trait, so adding an object kind is an
//! additive change: a new `SlotTag` value, a new `ConfigPayload` struct, and
//! a `RecoverableConfig` impl naming its live type. No class hierarchy, no
//! downcasts.
//!
//! ## Sharing
//!
//! One `StorageContext` serves the whole process. Indexing takes the write
//! lock exclusively; lookups are concurrent readers. Recovered objects own
//! their file handles and are independent of the context afterwards.

mod page_device;

pub use page_device::PageDevice;

use std::sync::Arc;

use eyre::{bail, Result};
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ErrorKind, StorageError};
use crate::file::StorageFile;
use crate::format::{
    config_slot_cast, ConfigPayload, FileOffsetPtr, CONFIG_BLOCK_HEADER_SIZE, CONFIG_SLOT_SIZE,
};

/// Runtime policy for opening the files that back recovered objects.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub read_only: bool,
}

/// A payload kind that can be recovered into a live object.
pub trait RecoverableConfig: ConfigPayload {
    type LiveObject;

    fn recover(
        config: FileOffsetPtr<'_, Self>,
        file: &StorageFile,
        options: &RuntimeOptions,
    ) -> Result<Self::LiveObject>;
}

#[derive(Clone)]
struct SlotLocation {
    file: Arc<StorageFile>,
    block_index: usize,
    slot_index: usize,
}

/// Process-wide index of recovered slots by `(tag, uuid)`.
#[derive(Default)]
pub struct StorageContext {
    index: RwLock<HashMap<(u16, Uuid), SlotLocation>>,
}

impl StorageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every tagged slot of `file`. Fails with `AlreadyExists` if
    /// any slot's UUID is already indexed under the same tag — in that case
    /// nothing from `file` is added.
    pub fn add_existing_file(&self, file: Arc<StorageFile>) -> Result<()> {
        let mut entries: Vec<((u16, Uuid), SlotLocation)> = Vec::new();

        for (block_index, config_block) in file.config_blocks().iter().enumerate() {
            for (slot_index, slot) in config_block.block().slots().iter().enumerate() {
                let Some(uuid) = slot_uuid(slot) else {
                    continue;
                };
                entries.push((
                    (slot.tag(), uuid),
                    SlotLocation {
                        file: Arc::clone(&file),
                        block_index,
                        slot_index,
                    },
                ));
            }
        }

        let mut index = self.index.write();

        for ((tag, uuid), _) in &entries {
            if index.contains_key(&(*tag, *uuid)) {
                bail!(StorageError::new(
                    ErrorKind::AlreadyExists,
                    format!("uuid {} is already indexed for tag {}", uuid, tag),
                ));
            }
        }
        let mut fresh: HashSet<(u16, Uuid)> = HashSet::new();
        for (key, _) in &entries {
            if !fresh.insert(*key) {
                bail!(StorageError::new(
                    ErrorKind::AlreadyExists,
                    format!("uuid {} appears twice in '{}'", key.1, file.path().display()),
                ));
            }
        }

        for (key, location) in entries {
            index.insert(key, location);
        }
        Ok(())
    }

    /// Recovers the live object for `uuid`, dispatching on the payload type.
    /// Fails with `NotFound` if the UUID was never indexed under `T`'s tag.
    pub fn recover_object<T: RecoverableConfig>(
        &self,
        uuid: &Uuid,
        options: &RuntimeOptions,
    ) -> Result<T::LiveObject> {
        let location = {
            let index = self.index.read();
            match index.get(&(T::TAG, *uuid)) {
                Some(location) => location.clone(),
                None => bail!(StorageError::new(
                    ErrorKind::NotFound,
                    format!("no object with uuid {} and tag {}", uuid, T::TAG),
                )),
            }
        };

        let config_block = &location.file.config_blocks()[location.block_index];
        let slot = &config_block.block().slots()[location.slot_index];
        let slot_offset = config_block.file_offset()
            + (CONFIG_BLOCK_HEADER_SIZE + location.slot_index * CONFIG_SLOT_SIZE) as u64;

        let config = config_slot_cast::<T>(slot)?;
        T::recover(FileOffsetPtr::new(slot_offset, config), &location.file, options)
    }
}

/// The UUID of a slot, for the tags that carry one. Untagged (zeroed) slots
/// yield `None` and are skipped by the indexer.
fn slot_uuid(slot: &crate::format::PackedConfigSlot) -> Option<Uuid> {
    use crate::format::{PackedPageDeviceConfig, SlotTag};

    match slot.slot_tag() {
        SlotTag::PageDevice => config_slot_cast::<PackedPageDeviceConfig>(slot)
            .ok()
            .map(|config| config.uuid()),
        SlotTag::Volume | SlotTag::PageArena | SlotTag::Unknown => None,
    }
}
