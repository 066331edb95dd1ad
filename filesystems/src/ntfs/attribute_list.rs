// $ATTRIBUTE_LIST records
// Each record maps (type, starting VCN) to the FILE record holding that piece

use crate::ntfs::bytes::{ensure_slice, read_file_reference, read_u16, read_u32, read_u64, read_u8, read_utf16};
use crate::ntfs::structures::ATTR_LIST_RECORD_SIZE;
use openntfs_core::NtfsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrListEntry {
    /// Offset of this record inside the list value.
    pub offset: usize,
    pub type_code: u32,
    pub record_length: u16,
    pub name_length: u8,
    pub name_offset: u8,
    pub starting_vcn: u64,
    /// MFT record number (low 48 bits of the base file reference).
    pub mft_record: u64,
    pub attribute_id: u16,
}

impl AttrListEntry {
    /// Decode the record at `offset`. The record must fit entirely inside
    /// `list` and have a nonzero length.
    pub fn parse(list: &[u8], offset: usize) -> Result<Self, NtfsError> {
        ensure_slice(list, offset, ATTR_LIST_RECORD_SIZE)?;
        let record_length = read_u16(list, offset + 0x04)?;
        if record_length == 0 || offset + record_length as usize > list.len() {
            return Err(NtfsError::corrupted(format!(
                "attribute list record at {:#x} has length {:#x} (list is {:#x})",
                offset,
                record_length,
                list.len()
            )));
        }

        Ok(Self {
            offset,
            type_code: read_u32(list, offset)?,
            record_length,
            name_length: read_u8(list, offset + 0x06)?,
            name_offset: read_u8(list, offset + 0x07)?,
            starting_vcn: read_u64(list, offset + 0x08)?,
            mft_record: read_file_reference(list, offset + 0x10)?,
            attribute_id: read_u16(list, offset + 0x18)?,
        })
    }

    pub fn next_offset(&self) -> usize {
        self.offset + self.record_length as usize
    }

    pub fn name(&self, list: &[u8]) -> Result<Vec<u16>, NtfsError> {
        read_utf16(list, self.offset + self.name_offset as usize, self.name_length as usize)
    }
}

/// Whether another record header can start at `offset`.
pub fn has_record_at(list: &[u8], offset: usize) -> bool {
    offset + ATTR_LIST_RECORD_SIZE <= list.len()
}
