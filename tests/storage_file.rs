//! End-to-end scenarios for the storage-file bootstrap layer: building over
//! a recording mock (exact I/O sequence), then real-file round-trips through
//! the chain reader and typed recovery.

use std::sync::Arc;

use eyre::Result;
use rand::RngCore;
use zerocopy::FromBytes;

use strata::{
    read_storage_file, round_up_bits, storage_error_kind, ConfigPayload, ErrorKind,
    PackedConfigBlock, PackedPageDeviceConfig, PageDeviceConfigOptions, RawBlockFile,
    RuntimeOptions, SlotTag, StdRawBlockFile, StorageContext, StorageFile, StorageFileBuilder,
    StorageFileConfigBlock, CONFIG_BLOCK_MAGIC, CONFIG_BLOCK_SIZE, CONFIG_BLOCK_VERSION,
    CONFIG_SLOT_SIZE, FAST_PAGE_DEVICE_INIT, NULL_FILE_OFFSET, PAGE_INIT_SECTOR_SIZE,
};

const TEST_PAGE_COUNT: u64 = 10;

const CONFIG_BLOCK_HEADER_SIZE: u64 = strata::format::CONFIG_BLOCK_HEADER_SIZE as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum IoCall {
    TruncateAtLeast { size: u64 },
    WriteSome { offset: u64, len: usize },
}

/// Records every call and keeps a byte image of everything written, so tests
/// can assert both the exact I/O sequence and the decoded block contents.
#[derive(Default)]
struct MockRawBlockFile {
    calls: Vec<IoCall>,
    image: Vec<u8>,
    write_limit: Option<usize>,
}

impl MockRawBlockFile {
    fn with_write_limit(limit: usize) -> Self {
        Self {
            write_limit: Some(limit),
            ..Self::default()
        }
    }

    fn written(&self, offset: u64, len: usize) -> &[u8] {
        &self.image[offset as usize..offset as usize + len]
    }
}

impl RawBlockFile for MockRawBlockFile {
    fn write_some(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let count = match self.write_limit {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        self.calls.push(IoCall::WriteSome {
            offset,
            len: count,
        });

        let end = offset as usize + count;
        if self.image.len() < end {
            self.image.resize(end, 0);
        }
        self.image[offset as usize..end].copy_from_slice(&buf[..count]);
        Ok(count)
    }

    fn read_some(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (offset as usize).min(self.image.len());
        let count = buf.len().min(self.image.len() - start);
        buf[..count].copy_from_slice(&self.image[start..start + count]);
        Ok(count)
    }

    fn truncate_at_least(&mut self, size: u64) -> Result<()> {
        self.calls.push(IoCall::TruncateAtLeast { size });
        if self.image.len() < size as usize {
            self.image.resize(size as usize, 0);
        }
        Ok(())
    }
}

fn device_options(page_count: u64, page_size_log2: u16) -> PageDeviceConfigOptions {
    PageDeviceConfigOptions {
        uuid: None,
        device_id: None,
        page_count,
        page_size_log2,
    }
}

/// Checks every emitted block against the layout the builder promises:
/// identity fields, CRC, chain links, slot counts, and per-slot page-0
/// placement (cursor walks forward from each block's end, aligned per page
/// size).
fn verify_storage_file_config_blocks(
    config_blocks: &[StorageFileConfigBlock],
    page_count: u64,
    page_size_log2: u16,
) {
    let page_size = 1u64 << page_size_log2;
    let mut expected_device_id = 0u64;

    for (block_index, config_block) in config_blocks.iter().enumerate() {
        let block = config_block.block();
        let block_offset = config_block.file_offset();

        assert_eq!(block.magic(), CONFIG_BLOCK_MAGIC);
        assert_eq!(block.version(), CONFIG_BLOCK_VERSION);
        assert_eq!(block.crc64(), block.true_crc64());

        if block_index == 0 {
            assert_eq!(block.prev_offset(), NULL_FILE_OFFSET);
        } else {
            let prev_offset = config_blocks[block_index - 1].file_offset();
            assert_eq!(block.prev_offset(), -((block_offset - prev_offset) as i64));
        }
        if block_index == config_blocks.len() - 1 {
            assert_eq!(block.next_offset(), NULL_FILE_OFFSET);
        } else {
            let next_offset = config_blocks[block_index + 1].file_offset();
            assert_eq!(block.next_offset(), (next_offset - block_offset) as i64);
        }

        let mut cursor = block_offset + CONFIG_BLOCK_SIZE as u64;

        for (slot_index, slot) in block.slots().iter().enumerate() {
            assert_eq!(slot.slot_tag(), SlotTag::PageDevice);

            let slot_offset =
                block_offset + CONFIG_BLOCK_HEADER_SIZE + (slot_index * CONFIG_SLOT_SIZE) as u64;
            let config = strata::config_slot_cast::<PackedPageDeviceConfig>(slot).unwrap();

            assert_eq!(config.device_id(), expected_device_id);
            assert_eq!(config.page_count(), page_count);
            assert_eq!(config.page_size_log2(), page_size_log2);

            let expected_page_0 = round_up_bits(page_size_log2 as u32, cursor);
            assert_eq!(
                config.page_0_offset(),
                (expected_page_0 - slot_offset) as i64,
                "block {} slot {}",
                block_index,
                slot_index
            );
            assert_eq!((slot_offset as i64 + config.page_0_offset()) % page_size as i64, 0);

            cursor = expected_page_0 + page_count * page_size;
            expected_device_id += 1;
        }

        if block_index < config_blocks.len() - 1 {
            assert_eq!(
                config_blocks[block_index + 1].file_offset(),
                round_up_bits(12, cursor)
            );
        }
    }
}

// S1: a builder over a strict mock, no operations: zero I/O calls.
#[test]
fn no_configs() {
    let mut file_mock = MockRawBlockFile::default();

    {
        let _builder = StorageFileBuilder::new(&mut file_mock, 0);
    }

    assert!(file_mock.calls.is_empty());
}

// S2: planning one device performs no I/O until flush.
#[test]
fn page_device_config_no_flush() {
    let mut file_mock = MockRawBlockFile::default();

    {
        let mut builder = StorageFileBuilder::new(&mut file_mock, 0);
        let packed_config = builder
            .add_object(device_options(TEST_PAGE_COUNT, 12))
            .unwrap();

        assert_eq!(packed_config.page_count(), TEST_PAGE_COUNT);
    }

    assert!(file_mock.calls.is_empty());
}

// Flushing a plan with zero objects is a no-op success.
#[test]
fn flush_without_objects_is_noop() {
    let mut file_mock = MockRawBlockFile::default();

    let builder = StorageFileBuilder::new(&mut file_mock, 128);
    builder.flush_all().unwrap();

    assert!(file_mock.calls.is_empty());
}

// S3: one device over every (base_offset, page_size_log2) combination; the
// observed sequence is exactly truncate, page-init writes, config block.
#[test]
fn page_device_config_flush() {
    for base_offset in [0u64, 128, 65536] {
        for page_size_log2 in [9u16, 10, 11, 12, 13, 16, 24] {
            let page_size = 1u64 << page_size_log2;
            let mut file_mock = MockRawBlockFile::default();

            let mut builder = StorageFileBuilder::new(&mut file_mock, base_offset);
            let packed_config = builder
                .add_object(device_options(TEST_PAGE_COUNT, page_size_log2))
                .unwrap();

            let expected_block_offset = round_up_bits(12, base_offset);
            let expected_page_0 = round_up_bits(
                page_size_log2 as u32,
                expected_block_offset + CONFIG_BLOCK_SIZE as u64,
            );
            let expected_file_size = expected_page_0 + TEST_PAGE_COUNT * page_size;

            let expected_slot_offset = expected_block_offset + CONFIG_BLOCK_HEADER_SIZE;
            assert_eq!(packed_config.file_offset(), expected_slot_offset);

            builder.flush_all().unwrap();

            let calls = &file_mock.calls;
            assert_eq!(
                calls[0],
                IoCall::TruncateAtLeast {
                    size: expected_file_size
                }
            );

            let init_writes: usize = if FAST_PAGE_DEVICE_INIT {
                0
            } else {
                TEST_PAGE_COUNT as usize
            };
            for call in &calls[1..1 + init_writes] {
                let IoCall::WriteSome { offset, len } = call else {
                    panic!("expected a page-init write, got {:?}", call);
                };
                assert!(*offset > expected_block_offset);
                assert_eq!(*len, PAGE_INIT_SECTOR_SIZE);
            }

            assert_eq!(
                calls[1 + init_writes],
                IoCall::WriteSome {
                    offset: expected_block_offset,
                    len: CONFIG_BLOCK_SIZE,
                }
            );
            assert_eq!(calls.len(), 2 + init_writes);

            // Decode the written block image and check it slot by slot.
            let image = file_mock.written(expected_block_offset, CONFIG_BLOCK_SIZE);
            let block = PackedConfigBlock::ref_from_bytes(image).unwrap();
            block.validate().unwrap();

            assert_eq!(block.prev_offset(), NULL_FILE_OFFSET);
            assert_eq!(block.next_offset(), NULL_FILE_OFFSET);
            assert_eq!(block.slot_count(), 1);

            let config =
                strata::config_slot_cast::<PackedPageDeviceConfig>(&block.slots()[0]).unwrap();
            assert_eq!(config.tag(), PackedPageDeviceConfig::TAG);
            assert_eq!(config.device_id(), 0);
            assert_eq!(config.page_count(), TEST_PAGE_COUNT);
            assert_eq!(config.page_size_log2(), page_size_log2);
            assert_eq!(
                config.page_0_offset(),
                (expected_page_0 - expected_slot_offset) as i64
            );
        }
    }
}

// A file that only accepts short writes still ends up with the exact image.
#[test]
fn flush_retries_short_writes() {
    let mut file_mock = MockRawBlockFile::with_write_limit(100);

    let mut builder = StorageFileBuilder::new(&mut file_mock, 0);
    builder
        .add_object(device_options(TEST_PAGE_COUNT, 12))
        .unwrap();
    builder.flush_all().unwrap();

    let image = file_mock.written(0, CONFIG_BLOCK_SIZE);
    let block = PackedConfigBlock::ref_from_bytes(image).unwrap();
    block.validate().unwrap();
    assert_eq!(block.slot_count(), 1);
}

// S4: build one device on a real file, read it back, recover it.
#[test]
fn write_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage");

    let mut test_file = StdRawBlockFile::create(&path).unwrap();
    let page_device_uuid;

    {
        let mut builder = StorageFileBuilder::new(&mut test_file, 0);
        let packed_config = builder
            .add_object(device_options(TEST_PAGE_COUNT, 12))
            .unwrap();

        // Save this for later.
        page_device_uuid = packed_config.uuid();

        builder.flush_all().unwrap();
    }

    let config_blocks = read_storage_file(&mut test_file, 0).unwrap();
    assert_eq!(config_blocks.len(), 1);
    verify_storage_file_config_blocks(&config_blocks, TEST_PAGE_COUNT, 12);

    let storage_file = Arc::new(StorageFile::new(&path, config_blocks));
    assert_eq!(
        storage_file
            .find_objects_by_type::<PackedPageDeviceConfig>()
            .count(),
        1
    );

    let storage_context = StorageContext::new();
    storage_context
        .add_existing_file(Arc::clone(&storage_file))
        .unwrap();

    let recovered_device = storage_context
        .recover_object::<PackedPageDeviceConfig>(&page_device_uuid, &RuntimeOptions::default())
        .unwrap();

    assert_eq!(recovered_device.uuid(), page_device_uuid);
    assert_eq!(recovered_device.page_count(), TEST_PAGE_COUNT);
    assert_eq!(recovered_device.page_size(), 4096);

    // Recovery is idempotent: a second handle refers to the same device.
    let second = storage_context
        .recover_object::<PackedPageDeviceConfig>(&page_device_uuid, &RuntimeOptions::default())
        .unwrap();
    assert_eq!(second.uuid(), recovered_device.uuid());
    assert_eq!(second.page_0_offset(), recovered_device.page_0_offset());
}

// S5: pre-seed the file with random bytes, build 125 devices, read back
// exactly 3 config blocks with 62/62/1 slots, recover the last uuid.
#[test]
fn write_read_many_packed_configs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage");
    let base_offset = 0u64;

    let mut test_file = StdRawBlockFile::create(&path).unwrap();

    // Random bytes covering the whole planned region, so stale garbage that
    // the builder fails to overwrite cannot go unnoticed.
    let seeded_len =
        base_offset + 3 * CONFIG_BLOCK_SIZE as u64 + 125 * TEST_PAGE_COUNT * 512;
    let mut noise = vec![0u8; round_up_bits(9, seeded_len) as usize];
    rand::thread_rng().fill_bytes(&mut noise);
    test_file.write_all(base_offset, &noise).unwrap();

    let mut inserted: Vec<(uuid::Uuid, u64)> = Vec::new();

    {
        let mut builder = StorageFileBuilder::new(&mut test_file, base_offset);
        for _ in 0..125 {
            let packed_config = builder
                .add_object(device_options(TEST_PAGE_COUNT, 9))
                .unwrap();
            inserted.push((packed_config.uuid(), packed_config.device_id()));
        }
        builder.flush_all().unwrap();
    }

    let config_blocks = read_storage_file(&mut test_file, base_offset).unwrap();
    assert_eq!(config_blocks.len(), 3);

    let slot_counts: Vec<u16> = config_blocks
        .iter()
        .map(|b| b.block().slot_count())
        .collect();
    assert_eq!(slot_counts, vec![62, 62, 1]);

    verify_storage_file_config_blocks(&config_blocks, TEST_PAGE_COUNT, 9);

    let storage_file = Arc::new(StorageFile::new(&path, config_blocks));

    // Round-trip: insertion order, identical payload identity.
    let read_back: Vec<(uuid::Uuid, u64)> = storage_file
        .find_objects_by_type::<PackedPageDeviceConfig>()
        .map(|config| (config.uuid(), config.device_id()))
        .collect();
    assert_eq!(read_back.len(), 125);
    assert_eq!(read_back, inserted);

    let storage_context = StorageContext::new();
    storage_context
        .add_existing_file(Arc::clone(&storage_file))
        .unwrap();

    let (last_uuid, _) = inserted[124];
    let recovered_device = storage_context
        .recover_object::<PackedPageDeviceConfig>(&last_uuid, &RuntimeOptions::default())
        .unwrap();

    assert_eq!(recovered_device.uuid(), last_uuid);
    assert_eq!(recovered_device.page_size(), 512);
}

#[test]
fn unknown_uuid_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage");

    let mut test_file = StdRawBlockFile::create(&path).unwrap();
    {
        let mut builder = StorageFileBuilder::new(&mut test_file, 0);
        builder
            .add_object(device_options(TEST_PAGE_COUNT, 12))
            .unwrap();
        builder.flush_all().unwrap();
    }

    let config_blocks = read_storage_file(&mut test_file, 0).unwrap();
    let storage_file = Arc::new(StorageFile::new(&path, config_blocks));

    let storage_context = StorageContext::new();
    storage_context.add_existing_file(storage_file).unwrap();

    let err = storage_context
        .recover_object::<PackedPageDeviceConfig>(&uuid::Uuid::new_v4(), &RuntimeOptions::default())
        .unwrap_err();
    assert_eq!(storage_error_kind(&err), Some(ErrorKind::NotFound));
}

#[test]
fn duplicate_uuid_already_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage");

    let mut test_file = StdRawBlockFile::create(&path).unwrap();
    let uuid;
    {
        let mut builder = StorageFileBuilder::new(&mut test_file, 0);
        uuid = builder
            .add_object(device_options(TEST_PAGE_COUNT, 12))
            .unwrap()
            .uuid();
        builder.flush_all().unwrap();
    }

    let storage_context = StorageContext::new();

    let blocks_a = read_storage_file(&mut test_file, 0).unwrap();
    storage_context
        .add_existing_file(Arc::new(StorageFile::new(&path, blocks_a)))
        .unwrap();

    // The same file indexed again carries the same uuid.
    let blocks_b = read_storage_file(&mut test_file, 0).unwrap();
    let err = storage_context
        .add_existing_file(Arc::new(StorageFile::new(&path, blocks_b)))
        .unwrap_err();

    assert_eq!(storage_error_kind(&err), Some(ErrorKind::AlreadyExists));
    assert!(err.to_string().contains(&uuid.to_string()));
}

// Non-zero base offsets shift the whole layout; the first block still lands
// on the next 4 KiB boundary and everything reads back.
#[test]
fn nonzero_base_offset_roundtrip() {
    for base_offset in [128u64, 65536] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage");

        let mut test_file = StdRawBlockFile::create(&path).unwrap();
        {
            let mut builder = StorageFileBuilder::new(&mut test_file, base_offset);
            builder
                .add_object(device_options(TEST_PAGE_COUNT, 12))
                .unwrap();
            builder.flush_all().unwrap();
        }

        let config_blocks = read_storage_file(&mut test_file, base_offset).unwrap();
        assert_eq!(config_blocks.len(), 1);
        assert_eq!(config_blocks[0].file_offset(), round_up_bits(12, base_offset));
        verify_storage_file_config_blocks(&config_blocks, TEST_PAGE_COUNT, 12);
    }
}
