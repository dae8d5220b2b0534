//! # StorageFile
//!
//! The in-memory view of a recovered storage file: its path plus the
//! ordered config blocks the reader collected. Slot payloads are enumerated
//! as [`FileOffsetPtr`] values — borrowed views tied to the owning
//! `StorageFile`, with explicit absolute offsets.

use std::path::{Path, PathBuf};

use crate::format::{
    config_slot_cast, ConfigPayload, FileOffsetPtr, CONFIG_BLOCK_HEADER_SIZE, CONFIG_SLOT_SIZE,
};

use super::reader::StorageFileConfigBlock;

#[derive(Debug)]
pub struct StorageFile {
    path: PathBuf,
    blocks: Vec<StorageFileConfigBlock>,
}

impl StorageFile {
    pub fn new(path: impl Into<PathBuf>, blocks: Vec<StorageFileConfigBlock>) -> Self {
        Self {
            path: path.into(),
            blocks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config_blocks(&self) -> &[StorageFileConfigBlock] {
        &self.blocks
    }

    /// Enumerates every slot whose tag matches `T`, in chain-then-slot
    /// order, yielding the payload view together with its absolute slot
    /// offset. The sequence is finite and restartable (each call builds a
    /// fresh iterator).
    pub fn find_objects_by_type<'a, T: ConfigPayload + 'a>(
        &'a self,
    ) -> impl Iterator<Item = FileOffsetPtr<'a, T>> + 'a {
        self.blocks.iter().flat_map(|config_block| {
            let slots_base = config_block.file_offset() + CONFIG_BLOCK_HEADER_SIZE as u64;
            config_block
                .block()
                .slots()
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.tag() == T::TAG)
                .filter_map(move |(index, slot)| {
                    let slot_offset = slots_base + (index * CONFIG_SLOT_SIZE) as u64;
                    config_slot_cast::<T>(slot)
                        .ok()
                        .map(|payload| FileOffsetPtr::new(slot_offset, payload))
                })
        })
    }
}
