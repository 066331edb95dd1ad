// Information records
// FileInfo is laid out like the firmware EFI_FILE_INFO so directory reads
// can hand out the encoded bytes directly

use crate::ntfs::bytes::{ensure_slice, read_u64};
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::structures::*;
use crate::ntfs::timestamps::{EfiTime, EFI_TIME_SIZE};
use crate::ntfs::volume::Volume;
use openntfs_core::NtfsError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const FILE_READ_ONLY: u64 = 0x0000_0000_0000_0001;
pub const FILE_DIRECTORY: u64 = 0x0000_0000_0000_0010;

/// Fixed part of an encoded [`FileInfo`]; the NUL-terminated name follows.
pub const FILE_INFO_HEADER_SIZE: usize = 0x50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_size: u64,
    pub physical_size: u64,
    pub create_time: EfiTime,
    pub last_access_time: EfiTime,
    pub modification_time: EfiTime,
    pub attribute: u64,
    pub file_name: String,
}

impl FileInfo {
    /// Read-only info for a node, with all three times set from
    /// `modified` (a FILETIME).
    pub fn new(name: &str, file_size: u64, is_dir: bool, modified: u64, cluster_size: u64) -> Self {
        let time = EfiTime::from_filetime(modified);
        let mut attribute = FILE_READ_ONLY;
        if is_dir {
            attribute |= FILE_DIRECTORY;
        }
        Self {
            file_size,
            physical_size: file_size.div_ceil(cluster_size.max(1)).saturating_mul(cluster_size),
            create_time: time,
            last_access_time: time,
            modification_time: time,
            attribute,
            file_name: name.to_string(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attribute & FILE_DIRECTORY != 0
    }

    pub fn encoded_size(&self) -> usize {
        FILE_INFO_HEADER_SIZE + (self.file_name.encode_utf16().count() + 1) * 2
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = self.encoded_size();
        let mut out = vec![0u8; size];
        out[0x00..0x08].copy_from_slice(&(size as u64).to_le_bytes());
        out[0x08..0x10].copy_from_slice(&self.file_size.to_le_bytes());
        out[0x10..0x18].copy_from_slice(&self.physical_size.to_le_bytes());
        self.create_time.encode(&mut out[0x18..0x18 + EFI_TIME_SIZE]);
        self.last_access_time.encode(&mut out[0x28..0x28 + EFI_TIME_SIZE]);
        self.modification_time.encode(&mut out[0x38..0x38 + EFI_TIME_SIZE]);
        out[0x48..0x50].copy_from_slice(&self.attribute.to_le_bytes());
        for (i, unit) in self.file_name.encode_utf16().enumerate() {
            let at = FILE_INFO_HEADER_SIZE + i * 2;
            out[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, NtfsError> {
        let size = read_u64(data, 0x00)? as usize;
        if size < FILE_INFO_HEADER_SIZE {
            return Err(NtfsError::invalid("file info record is shorter than its header"));
        }
        let record = ensure_slice(data, 0, size)?;
        let units: Vec<u16> = record[FILE_INFO_HEADER_SIZE..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();

        Ok(Self {
            file_size: read_u64(record, 0x08)?,
            physical_size: read_u64(record, 0x10)?,
            create_time: EfiTime::decode(record, 0x18)?,
            last_access_time: EfiTime::decode(record, 0x28)?,
            modification_time: EfiTime::decode(record, 0x38)?,
            attribute: read_u64(record, 0x48)?,
            file_name: String::from_utf16_lossy(&units),
        })
    }
}

/// Volume-wide information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemInfo {
    pub read_only: bool,
    pub volume_size: u64,
    pub free_space: u64,
    pub block_size: u32,
    pub volume_label: String,
}

/// Label from `$VOLUME_NAME` of record 3; empty when there is none.
pub fn read_volume_label(volume: &Volume) -> Result<String, NtfsError> {
    let record = Arc::new(volume.read_mft_record(MFT_RECORD_VOLUME)?);
    let Some((cursor, location)) = AttrCursor::locate(volume, record, false, ATTR_TYPE_VOLUME_NAME)? else {
        return Ok(String::new());
    };
    let value = location.header.resident_value(cursor.record_bytes(location.source))?;
    let units: Vec<u16> = value
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

pub fn filesystem_info(volume: &Volume) -> Result<FileSystemInfo, NtfsError> {
    let device = volume.device_geometry();
    Ok(FileSystemInfo {
        read_only: true,
        volume_size: device.size_bytes(),
        free_space: 0,
        block_size: volume.geometry().cluster_size as u32,
        volume_label: read_volume_label(volume)?,
    })
}
