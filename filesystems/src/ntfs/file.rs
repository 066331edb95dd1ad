// File nodes
// An MFT record number plus, once loaded, its FILE record and data stream

use crate::ntfs::data::read_attr;
use crate::ntfs::mft::FileRecord;
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::structures::*;
use crate::ntfs::timestamps::NtfsTimestamps;
use crate::ntfs::volume::Volume;
use log::debug;
use openntfs_core::NtfsError;
use std::sync::Arc;

/// A file or directory reached through an index entry (or the root).
///
/// Nodes start unloaded; [`NtfsFile::load`] reads the FILE record and, for
/// non-directories, locates `$DATA`.
#[derive(Debug, Clone)]
pub struct NtfsFile {
    pub inode: u64,
    /// Last-modified FILETIME copied from the index entry.
    pub altered_time: u64,
    record: Option<Arc<FileRecord>>,
    data: Option<AttrCursor>,
    data_size: u64,
}

impl NtfsFile {
    pub fn new(inode: u64, altered_time: u64) -> Self {
        Self {
            inode,
            altered_time,
            record: None,
            data: None,
            data_size: 0,
        }
    }

    pub fn open(volume: &Volume, inode: u64) -> Result<Self, NtfsError> {
        let mut file = Self::new(inode, 0);
        file.load(volume)?;
        Ok(file)
    }

    pub fn is_loaded(&self) -> bool {
        self.record.is_some()
    }

    pub fn load(&mut self, volume: &Volume) -> Result<(), NtfsError> {
        if self.is_loaded() {
            return Ok(());
        }

        let record = volume.read_mft_record(self.inode)?;
        let flags = record.header.flags;
        if flags & !FILE_RECORD_SUPPORTED_FLAGS != 0 {
            debug!("MFT record {:#x} has unsupported flags {:#x}", self.inode, flags);
            return Err(NtfsError::corrupted(format!(
                "MFT record {:#x} has invalid or unsupported flags",
                self.inode
            )));
        }
        if !record.header.is_in_use() {
            return Err(NtfsError::corrupted(format!("MFT record {:#x} is not in use", self.inode)));
        }

        let record = Arc::new(record);
        if record.header.is_directory() {
            AttrCursor::new(record.clone(), false)?;
        } else {
            let (cursor, location) = AttrCursor::locate(volume, record.clone(), false, ATTR_TYPE_DATA)?
                .ok_or_else(|| NtfsError::corrupted(format!("no $DATA in MFT record {:#x}", self.inode)))?;
            if location.header.is_encrypted() {
                return Err(NtfsError::Unsupported(format!(
                    "MFT record {:#x} holds encrypted data",
                    self.inode
                )));
            }
            self.data_size = location.header.data_size();
            self.data = Some(cursor);
        }
        self.record = Some(record);
        Ok(())
    }

    pub fn record(&self) -> Result<&Arc<FileRecord>, NtfsError> {
        self.record
            .as_ref()
            .ok_or_else(|| NtfsError::invalid(format!("MFT record {:#x} is not loaded", self.inode)))
    }

    pub fn is_directory(&self) -> bool {
        self.record.as_ref().map_or(false, |r| r.header.is_directory())
    }

    /// Size of the unnamed `$DATA` stream; 0 for directories.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Read `dest.len()` bytes of `$DATA` at `offset`.
    pub fn read(&mut self, volume: &Volume, dest: &mut [u8], offset: u64) -> Result<(), NtfsError> {
        self.load(volume)?;
        let cursor = self
            .data
            .as_mut()
            .ok_or_else(|| NtfsError::invalid(format!("MFT record {:#x} has no data stream", self.inode)))?;
        read_attr(volume, cursor, dest, offset)
    }

    /// Times from `$STANDARD_INFORMATION`, when the record has one.
    pub fn standard_times(&mut self, volume: &Volume) -> Result<Option<NtfsTimestamps>, NtfsError> {
        self.load(volume)?;
        let record = self.record()?.clone();
        let Some((cursor, location)) =
            AttrCursor::locate(volume, record, false, ATTR_TYPE_STANDARD_INFORMATION)?
        else {
            return Ok(None);
        };
        let value = location.header.resident_value(cursor.record_bytes(location.source))?;
        NtfsTimestamps::parse(value).map(Some)
    }
}
