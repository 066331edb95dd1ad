// NTFS attribute headers
// Resident and non-resident headers decode into one owned, tagged value

use crate::ntfs::bytes::{ensure_slice, read_file_reference, read_u16, read_u32, read_u64, read_u8, read_utf16};
use crate::ntfs::structures::*;
use log::trace;
use openntfs_core::NtfsError;

/// Layout-specific half of an attribute header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrForm {
    Resident {
        value_length: u32,
        value_offset: u16,
        indexed: u8,
    },
    NonResident {
        starting_vcn: u64,
        last_vcn: u64,
        data_runs_offset: u16,
        /// log2 of clusters per compression unit, 0 when uncompressed.
        compression_unit: u16,
        allocated_size: u64,
        real_size: u64,
        initialized_size: u64,
    },
}

/// Decoded attribute header, remembering where it sits in its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrHeader {
    pub offset: usize,
    pub type_code: u32,
    pub length: u32,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub attribute_id: u16,
    pub form: AttrForm,
}

impl AttrHeader {
    /// Decode the header at `offset` in `record`. Only the fixed part is
    /// validated here; callers check `length` against their own window.
    pub fn parse(record: &[u8], offset: usize) -> Result<Self, NtfsError> {
        ensure_slice(record, offset, RESIDENT_HEADER_SIZE)?;
        let non_resident = read_u8(record, offset + 0x08)? != 0;

        let form = if non_resident {
            ensure_slice(record, offset, NONRESIDENT_HEADER_SIZE)?;
            AttrForm::NonResident {
                starting_vcn: read_u64(record, offset + 0x10)?,
                last_vcn: read_u64(record, offset + 0x18)?,
                data_runs_offset: read_u16(record, offset + 0x20)?,
                compression_unit: read_u16(record, offset + 0x22)?,
                allocated_size: read_u64(record, offset + 0x28)?,
                real_size: read_u64(record, offset + 0x30)?,
                initialized_size: read_u64(record, offset + 0x38)?,
            }
        } else {
            AttrForm::Resident {
                value_length: read_u32(record, offset + 0x10)?,
                value_offset: read_u16(record, offset + 0x14)?,
                indexed: read_u8(record, offset + 0x16)?,
            }
        };

        Ok(Self {
            offset,
            type_code: read_u32(record, offset)?,
            length: read_u32(record, offset + 0x04)?,
            name_length: read_u8(record, offset + 0x09)?,
            name_offset: read_u16(record, offset + 0x0A)?,
            flags: read_u16(record, offset + 0x0C)?,
            attribute_id: read_u16(record, offset + 0x0E)?,
            form,
        })
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.form, AttrForm::Resident { .. })
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & ATTR_FLAG_COMPRESSED != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & ATTR_FLAG_ENCRYPTED != 0
    }

    pub fn is_sparse(&self) -> bool {
        self.flags & ATTR_FLAG_SPARSE != 0
    }

    /// Stream size: value length when resident, real size otherwise.
    pub fn data_size(&self) -> u64 {
        match self.form {
            AttrForm::Resident { value_length, .. } => value_length as u64,
            AttrForm::NonResident { real_size, .. } => real_size,
        }
    }

    pub fn starting_vcn(&self) -> u64 {
        match self.form {
            AttrForm::Resident { .. } => 0,
            AttrForm::NonResident { starting_vcn, .. } => starting_vcn,
        }
    }

    pub fn name(&self, record: &[u8]) -> Result<Vec<u16>, NtfsError> {
        if self.name_length == 0 {
            return Ok(Vec::new());
        }
        read_utf16(record, self.offset + self.name_offset as usize, self.name_length as usize)
    }

    pub fn name_is(&self, record: &[u8], expected: &str) -> Result<bool, NtfsError> {
        let name = self.name(record)?;
        Ok(name.iter().copied().eq(expected.encode_utf16()))
    }

    /// Borrow the value of a resident attribute, bounded by the attribute
    /// length and the record.
    pub fn resident_value<'a>(&self, record: &'a [u8]) -> Result<&'a [u8], NtfsError> {
        match self.form {
            AttrForm::Resident { value_length, value_offset, .. } => {
                let end = value_offset as u64 + value_length as u64;
                if end > self.length as u64 {
                    trace!(
                        "resident value {:#x}+{:#x} overruns attribute of {:#x}",
                        value_offset,
                        value_length,
                        self.length
                    );
                    return Err(NtfsError::corrupted("resident value exceeds attribute"));
                }
                ensure_slice(record, self.offset + value_offset as usize, value_length as usize)
            }
            AttrForm::NonResident { .. } => {
                Err(NtfsError::corrupted("expected a resident attribute"))
            }
        }
    }
}

/// A decoded `$FILE_NAME` value, from an attribute or an index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub parent_directory: u64,
    pub creation_time: u64,
    pub altered_time: u64,
    pub changed_mft_time: u64,
    pub read_time: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
    pub reparse_tag: u32,
    pub namespace: u8,
    pub name: Vec<u16>,
}

impl FileName {
    /// Decode the fixed header at `offset`; the name must fit in `data`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self, NtfsError> {
        ensure_slice(data, offset, FILE_NAME_HEADER_SIZE)?;
        let name_length = read_u8(data, offset + FN_NAME_LENGTH)? as usize;
        Ok(Self {
            parent_directory: read_file_reference(data, offset + FN_PARENT_DIRECTORY)?,
            creation_time: read_u64(data, offset + FN_CREATION_TIME)?,
            altered_time: read_u64(data, offset + FN_ALTERED_TIME)?,
            changed_mft_time: read_u64(data, offset + FN_CHANGED_MFT_TIME)?,
            read_time: read_u64(data, offset + FN_READ_TIME)?,
            allocated_size: read_u64(data, offset + FN_ALLOCATED_SIZE)?,
            real_size: read_u64(data, offset + FN_REAL_SIZE)?,
            flags: read_u32(data, offset + FN_FLAGS)?,
            reparse_tag: read_u32(data, offset + 0x3C)?,
            namespace: read_u8(data, offset + FN_NAMESPACE)?,
            name: read_utf16(data, offset + FILE_NAME_HEADER_SIZE, name_length)?,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FILE_ATTR_DIRECTORY != 0
    }

    pub fn is_reparse_point(&self) -> bool {
        self.flags & FILE_ATTR_REPARSE != 0
    }
}
