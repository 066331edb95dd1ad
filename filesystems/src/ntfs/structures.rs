// NTFS on-disk constants
// Layout offsets for the records the read path decodes

use static_assertions::const_assert;

// Signatures
pub const NTFS_OEM_ID: &[u8; 4] = b"NTFS";
pub const FILE_RECORD_MAGIC: &[u8; 4] = b"FILE";
pub const INDEX_RECORD_MAGIC: &[u8; 4] = b"INDX";

// Well-known MFT record numbers
pub const MFT_RECORD_MFT: u64 = 0;
pub const MFT_RECORD_VOLUME: u64 = 3;
pub const MFT_RECORD_ROOT: u64 = 5;

// Driver limits on record sizes
pub const NTFS_MAX_MFT: usize = 4096;
pub const NTFS_MAX_IDX: usize = 16384;
const_assert!(NTFS_MAX_MFT <= NTFS_MAX_IDX);

/// Largest stream this engine reads into memory in one piece.
pub const MAX_FILE_SIZE: u64 = (u32::MAX & !7) as u64;

pub const MAX_PATH: usize = 1024;

// Attribute type codes
pub const ATTR_TYPE_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_TYPE_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_TYPE_FILE_NAME: u32 = 0x30;
pub const ATTR_TYPE_VOLUME_NAME: u32 = 0x60;
pub const ATTR_TYPE_VOLUME_INFORMATION: u32 = 0x70;
pub const ATTR_TYPE_DATA: u32 = 0x80;
pub const ATTR_TYPE_INDEX_ROOT: u32 = 0x90;
pub const ATTR_TYPE_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_TYPE_BITMAP: u32 = 0xB0;
pub const ATTR_TYPE_REPARSE_POINT: u32 = 0xC0;
pub const ATTR_TYPE_END: u32 = 0xFFFF_FFFF;

/// Wildcard accepted by the attribute resolver.
pub const ATTR_TYPE_ANY: u32 = 0;

// FILE record header
pub const FILE_RECORD_HEADER_SIZE: usize = 0x30;
pub const FR_USA_OFFSET: usize = 0x04;
pub const FR_USA_SIZE: usize = 0x06;
pub const FR_SEQUENCE_NUMBER: usize = 0x10;
pub const FR_HARD_LINK_COUNT: usize = 0x12;
pub const FR_ATTRIBUTE_OFFSET: usize = 0x14;
pub const FR_FLAGS: usize = 0x16;
pub const FR_REAL_SIZE: usize = 0x18;
pub const FR_ALLOCATED_SIZE: usize = 0x1C;
pub const FR_BASE_FILE_RECORD: usize = 0x20;

pub const FILE_RECORD_IN_USE: u16 = 0x0001;
pub const FILE_RECORD_IS_DIRECTORY: u16 = 0x0002;
pub const FILE_RECORD_IN_EXTEND: u16 = 0x0004;
pub const FILE_RECORD_IS_VIEW_INDEX: u16 = 0x0008;
pub const FILE_RECORD_SUPPORTED_FLAGS: u16 =
    FILE_RECORD_IN_USE | FILE_RECORD_IS_DIRECTORY | FILE_RECORD_IN_EXTEND | FILE_RECORD_IS_VIEW_INDEX;

// Attribute headers
pub const RESIDENT_HEADER_SIZE: usize = 0x18;
pub const NONRESIDENT_HEADER_SIZE: usize = 0x40;
const_assert!(RESIDENT_HEADER_SIZE < NONRESIDENT_HEADER_SIZE);

pub const ATTR_FLAG_COMPRESSED: u16 = 0x0001;
pub const ATTR_FLAG_ENCRYPTED: u16 = 0x4000;
pub const ATTR_FLAG_SPARSE: u16 = 0x8000;

// $ATTRIBUTE_LIST record
pub const ATTR_LIST_RECORD_SIZE: usize = 0x1A;

// $FILE_NAME
pub const FILE_NAME_HEADER_SIZE: usize = 0x42;
pub const FN_PARENT_DIRECTORY: usize = 0x00;
pub const FN_CREATION_TIME: usize = 0x08;
pub const FN_ALTERED_TIME: usize = 0x10;
pub const FN_CHANGED_MFT_TIME: usize = 0x18;
pub const FN_READ_TIME: usize = 0x20;
pub const FN_ALLOCATED_SIZE: usize = 0x28;
pub const FN_REAL_SIZE: usize = 0x30;
pub const FN_FLAGS: usize = 0x38;
pub const FN_NAME_LENGTH: usize = 0x40;
pub const FN_NAMESPACE: usize = 0x41;

pub const FILE_ATTR_REPARSE: u32 = 0x0400;
pub const FILE_ATTR_COMPRESSED: u32 = 0x0800;
pub const FILE_ATTR_ENCRYPTED: u32 = 0x4000;
pub const FILE_ATTR_DIRECTORY: u32 = 0x1000_0000;

pub const NAMESPACE_POSIX: u8 = 0;
pub const NAMESPACE_WIN32: u8 = 1;
pub const NAMESPACE_DOS: u8 = 2;
pub const NAMESPACE_WIN32_DOS: u8 = 3;

// Index structures
pub const INDEX_ENTRY_HEADER_SIZE: usize = 0x10;
pub const INDEX_ENTRY_SUB_NODE: u16 = 0x0001;
pub const INDEX_ENTRY_LAST: u16 = 0x0002;

pub const INDEX_ROOT_HEADER_SIZE: usize = 0x10;
/// Fixed part of an INDX record; entry offsets are relative to its end.
pub const INDEX_RECORD_HEADER_SIZE: usize = 0x18;
pub const INDEX_NODE_HEADER_SIZE: usize = 0x10;
pub const I30_NAME: &str = "$I30";

// Reparse points
pub const REPARSE_HEADER_SIZE: usize = 0x10;
pub const REPARSE_TAG_IS_ALIAS: u32 = 0x2000_0000;
pub const REPARSE_TAG_IS_MICROSOFT: u32 = 0x8000_0000;
pub const REPARSE_TAG_SYMLINK: u32 = REPARSE_TAG_IS_MICROSOFT | REPARSE_TAG_IS_ALIAS | 0x0C;
pub const REPARSE_TAG_MOUNT_POINT: u32 = REPARSE_TAG_IS_MICROSOFT | REPARSE_TAG_IS_ALIAS | 0x03;

// Compression
pub const COMPRESSION_BLOCK: usize = 4096;
pub const COMPRESSION_UNIT_CLUSTERS: u64 = 16;
/// log2 of the cluster count per compression unit, as stored on disk.
pub const COMPRESSION_UNIT_SHIFT: u16 = 4;
pub const BLOCK_IS_COMPRESSED: u16 = 0x8000;
pub const BLOCK_LENGTH_MASK: u16 = 0x0FFF;

const_assert!(COMPRESSION_UNIT_CLUSTERS == 1 << COMPRESSION_UNIT_SHIFT);
