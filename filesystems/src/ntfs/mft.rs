// FILE record handling
// Update-sequence fixup plus the FILE record header

use crate::ntfs::bytes::{ensure_slice, read_file_reference, read_u16, read_u32};
use crate::ntfs::structures::*;
use log::{debug, trace};
use openntfs_core::NtfsError;

/// Validate and undo the multi-sector transfer protection on a FILE or
/// INDX record in place.
///
/// A magic mismatch is `NotFound` so callers can tell "not this kind of
/// record" from a damaged one. Every other failure is corruption.
pub fn apply_fixup(buffer: &mut [u8], magic: &[u8; 4], sector_size: usize) -> Result<(), NtfsError> {
    let length = buffer.len();
    if length < FILE_RECORD_HEADER_SIZE {
        debug!("Fixup: record of {} bytes is shorter than its header", length);
        return Err(NtfsError::corrupted("record shorter than its header"));
    }

    if &buffer[0..4] != magic {
        trace!("Fixup: magic {:02X?} is not {:?}", &buffer[0..4], magic);
        return Err(NtfsError::not_found(format!(
            "record magic {:?}",
            String::from_utf8_lossy(magic)
        )));
    }

    let usa_offset = read_u16(buffer, FR_USA_OFFSET)? as usize;
    let usa_size = read_u16(buffer, FR_USA_SIZE)? as usize;

    if usa_offset + 2 > length {
        return Err(NtfsError::corrupted("update sequence offset beyond record"));
    }

    if sector_size < 2 || usa_size.wrapping_sub(1) != length / sector_size {
        debug!(
            "Fixup: update sequence covers {} sectors, record has {}",
            usa_size.saturating_sub(1),
            length / sector_size.max(1)
        );
        return Err(NtfsError::corrupted("update sequence size does not match record size"));
    }

    let usn = [buffer[usa_offset], buffer[usa_offset + 1]];
    let mut usa_pos = usa_offset;
    let mut sector_end = sector_size - 2;

    while sector_end + 2 <= length {
        usa_pos += 2;
        if usa_pos + 2 > length {
            return Err(NtfsError::corrupted("update sequence array beyond record"));
        }

        if buffer[sector_end..sector_end + 2] != usn {
            debug!(
                "Fixup: torn write at {:#x}: found {:02X?}, expected {:02X?}",
                sector_end,
                &buffer[sector_end..sector_end + 2],
                usn
            );
            return Err(NtfsError::corrupted("update sequence number mismatch"));
        }

        buffer[sector_end] = buffer[usa_pos];
        buffer[sector_end + 1] = buffer[usa_pos + 1];
        sector_end += sector_size;
    }

    Ok(())
}

/// Decoded FILE record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecordHeader {
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub attribute_offset: u16,
    pub flags: u16,
    pub real_size: u32,
    pub allocated_size: u32,
    pub base_file_record: u64,
}

impl FileRecordHeader {
    pub fn parse(data: &[u8]) -> Result<Self, NtfsError> {
        ensure_slice(data, 0, FILE_RECORD_HEADER_SIZE)?;
        Ok(Self {
            sequence_number: read_u16(data, FR_SEQUENCE_NUMBER)?,
            hard_link_count: read_u16(data, FR_HARD_LINK_COUNT)?,
            attribute_offset: read_u16(data, FR_ATTRIBUTE_OFFSET)?,
            flags: read_u16(data, FR_FLAGS)?,
            real_size: read_u32(data, FR_REAL_SIZE)?,
            allocated_size: read_u32(data, FR_ALLOCATED_SIZE)?,
            base_file_record: read_file_reference(data, FR_BASE_FILE_RECORD)?,
        })
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & FILE_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FILE_RECORD_IS_DIRECTORY != 0
    }
}

/// A fixed-up FILE record.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub number: u64,
    pub header: FileRecordHeader,
    data: Vec<u8>,
}

impl FileRecord {
    /// Fix up `data` and decode its header.
    pub fn from_disk(number: u64, mut data: Vec<u8>, sector_size: usize) -> Result<Self, NtfsError> {
        apply_fixup(&mut data, FILE_RECORD_MAGIC, sector_size).map_err(|e| match e {
            NtfsError::NotFound(_) => {
                NtfsError::corrupted(format!("MFT record {} has no FILE signature", number))
            }
            other => other,
        })?;
        let header = FileRecordHeader::parse(&data)?;
        trace!(
            "MFT record {}: flags {:#x}, attrs at {:#x}, {}/{} bytes",
            number,
            header.flags,
            header.attribute_offset,
            header.real_size,
            header.allocated_size
        );
        Ok(Self { number, header, data })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(number: u64, header: FileRecordHeader, data: Vec<u8>) -> Self {
        Self { number, header, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
