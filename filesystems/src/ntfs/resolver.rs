// Attribute resolver
// Finds attributes of a FILE record, following $ATTRIBUTE_LIST into
// extension records when the base record runs out

use crate::ntfs::attribute_list::{has_record_at, AttrListEntry};
use crate::ntfs::attributes::{AttrForm, AttrHeader};
use crate::ntfs::bytes::read_u32;
use crate::ntfs::data;
use crate::ntfs::mft::FileRecord;
use crate::ntfs::structures::*;
use crate::ntfs::volume::Volume;
use log::{debug, trace, warn};
use openntfs_core::NtfsError;
use std::sync::Arc;

/// Which record a located attribute lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrSource {
    Base,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrLocation {
    pub source: AttrSource,
    pub header: AttrHeader,
}

/// Iteration state over the attributes of one file.
///
/// Scans the base record first. Once it is exhausted and the record has an
/// `$ATTRIBUTE_LIST`, the list is loaded and scanning continues through its
/// entries, with `next`/`current` becoming offsets into the list.
#[derive(Debug, Clone)]
pub struct AttrCursor {
    base: Arc<FileRecord>,
    mft_file: bool,
    next: usize,
    current: usize,
    list_attr: Option<usize>,
    list: Option<Vec<u8>>,
    extension: Option<FileRecord>,
    primary: Option<AttrHeader>,
}

impl AttrCursor {
    /// Validate the record's attribute window and position before its
    /// first attribute.
    pub fn new(base: Arc<FileRecord>, mft_file: bool) -> Result<Self, NtfsError> {
        let header = &base.header;
        let attribute_offset = header.attribute_offset as usize;
        if attribute_offset + RESIDENT_HEADER_SIZE > base.size()
            || header.attribute_offset as u32 > header.real_size
            || header.real_size > header.allocated_size
            || header.real_size as usize > base.size()
        {
            debug!(
                "MFT record {}: attrs at {:#x}, {}/{} bytes in a {} byte record",
                base.number,
                header.attribute_offset,
                header.real_size,
                header.allocated_size,
                base.size()
            );
            return Err(NtfsError::corrupted(format!(
                "MFT record {} has an invalid attribute area",
                base.number
            )));
        }

        Ok(Self {
            base,
            mft_file,
            next: attribute_offset,
            current: attribute_offset,
            list_attr: None,
            list: None,
            extension: None,
            primary: None,
        })
    }

    /// Find the first attribute of `type_code` and position the cursor on it,
    /// preferring the `$ATTRIBUTE_LIST` view when the file has one.
    pub fn locate(
        volume: &Volume,
        base: Arc<FileRecord>,
        mft_file: bool,
        type_code: u32,
    ) -> Result<Option<(AttrCursor, AttrLocation)>, NtfsError> {
        let mut cursor = AttrCursor::new(base.clone(), mft_file)?;
        let Some(first) = cursor.find_attr(volume, type_code)? else {
            return Ok(None);
        };

        let location = if cursor.in_attribute_list() {
            first
        } else {
            let mut from_list = None;
            while let Some(location) = cursor.find_attr(volume, type_code)? {
                if cursor.in_attribute_list() {
                    from_list = Some(location);
                    break;
                }
            }
            match from_list {
                Some(location) => location,
                None => {
                    cursor = AttrCursor::new(base, mft_file)?;
                    cursor
                        .find_attr(volume, type_code)?
                        .ok_or_else(|| NtfsError::corrupted("attribute vanished on rescan"))?
                }
            }
        };

        cursor.primary = Some(location.header);
        Ok(Some((cursor, location)))
    }

    pub fn base(&self) -> &Arc<FileRecord> {
        &self.base
    }

    pub fn is_mft_file(&self) -> bool {
        self.mft_file
    }

    pub fn in_attribute_list(&self) -> bool {
        self.list.is_some()
    }

    /// Header of the stream's first fragment, set by [`AttrCursor::locate`].
    pub fn primary(&self) -> Option<AttrHeader> {
        self.primary
    }

    pub(crate) fn set_primary(&mut self, header: AttrHeader) {
        self.primary = Some(header);
    }

    pub fn record_bytes(&self, source: AttrSource) -> &[u8] {
        match (source, &self.extension) {
            (AttrSource::Extension, Some(record)) => record.data(),
            _ => self.base.data(),
        }
    }

    pub(crate) fn mark(&self) -> usize {
        self.current
    }

    pub(crate) fn restore(&mut self, current: usize) {
        self.current = current;
    }

    /// Next attribute of `type_code` (`ATTR_TYPE_ANY` matches everything).
    pub fn find_attr(&mut self, volume: &Volume, type_code: u32) -> Result<Option<AttrLocation>, NtfsError> {
        if self.list.is_none() {
            if let Some(location) = self.find_in_record(type_code)? {
                return Ok(Some(location));
            }
            let Some(list_offset) = self.list_attr else {
                return Ok(None);
            };
            self.load_list(volume, list_offset)?;
            self.next = 0;
        }
        self.find_in_list(volume, type_code)
    }

    /// Scan the base record only, never loading the attribute list.
    pub fn find_in_record(&mut self, type_code: u32) -> Result<Option<AttrLocation>, NtfsError> {
        let end = self.base.header.real_size as usize;
        while let Some((header, next)) = next_attribute(self.base.data(), self.next, end)? {
            self.current = self.next;
            self.next = next;
            if header.type_code == ATTR_TYPE_ATTRIBUTE_LIST {
                self.list_attr = Some(self.current);
            }
            if type_code == ATTR_TYPE_ANY || header.type_code == type_code {
                return Ok(Some(AttrLocation { source: AttrSource::Base, header }));
            }
        }
        Ok(None)
    }

    fn load_list(&mut self, volume: &Volume, offset: usize) -> Result<(), NtfsError> {
        let record = self.base.data();
        let header = AttrHeader::parse(record, offset)?;
        let list = match header.form {
            AttrForm::Resident { value_offset, .. } => {
                if value_offset as u32 >= header.length {
                    return Err(NtfsError::corrupted("attribute list value offset is invalid"));
                }
                header.resident_value(record)?.to_vec()
            }
            AttrForm::NonResident { real_size, .. } => {
                if real_size > MAX_FILE_SIZE || real_size > volume.geometry().volume_size() {
                    return Err(NtfsError::corrupted(format!(
                        "attribute list of {:#x} bytes is too large",
                        real_size
                    )));
                }
                let mut list = Vec::new();
                list.try_reserve_exact(real_size as usize).map_err(|_| {
                    NtfsError::OutOfResources(format!("attribute list of {} bytes", real_size))
                })?;
                list.resize(real_size as usize, 0);
                data::read_data_detached(volume, record, &header, &mut list, 0)?;
                list
            }
        };

        trace!(
            "MFT record {}: loaded attribute list of {} bytes",
            self.base.number,
            list.len()
        );
        self.list = Some(list);
        Ok(())
    }

    fn find_in_list(&mut self, volume: &Volume, type_code: u32) -> Result<Option<AttrLocation>, NtfsError> {
        loop {
            let entry = {
                let Some(list) = self.list.as_deref() else {
                    return Ok(None);
                };
                if !has_record_at(list, self.next) {
                    return Ok(None);
                }
                AttrListEntry::parse(list, self.next)?
            };

            self.current = self.next;
            self.next = entry.next_offset();
            if type_code != ATTR_TYPE_ANY && entry.type_code != type_code {
                continue;
            }
            return self.load_entry(volume, &entry).map(Some);
        }
    }

    /// Bring in the record named by `entry` and find the attribute it
    /// describes there.
    fn load_entry(&mut self, volume: &Volume, entry: &AttrListEntry) -> Result<AttrLocation, NtfsError> {
        let source = if entry.mft_record == self.base.number {
            AttrSource::Base
        } else {
            let cached = self.extension.as_ref().map(|r| r.number) == Some(entry.mft_record);
            if !cached {
                let record = if self.mft_file {
                    volume.read_mft_record_bootstrap(entry.mft_record)?
                } else {
                    volume.read_mft_record(entry.mft_record)?
                };
                self.extension = Some(record);
            }
            AttrSource::Extension
        };

        let record = match (source, &self.extension) {
            (AttrSource::Extension, Some(record)) => record,
            _ => self.base.as_ref(),
        };
        let end = record.header.real_size as usize;
        let start = record.header.attribute_offset as usize;
        let record = record.data();

        let mut found: Option<AttrHeader> = None;
        let mut pos = start;
        while let Some((header, next)) = next_attribute(record, pos, end)? {
            if header.type_code == entry.type_code && header.attribute_id == entry.attribute_id {
                if found.is_some() {
                    warn!(
                        "MFT record {} holds more than one attribute {:#x} with id {}, using the first",
                        entry.mft_record, entry.type_code, entry.attribute_id
                    );
                    break;
                }
                found = Some(header);
            }
            pos = next;
        }

        match found {
            Some(header) => Ok(AttrLocation { source, header }),
            None => {
                debug!(
                    "attribute list names type {:#x} id {} in record {}, but it is not there",
                    entry.type_code, entry.attribute_id, entry.mft_record
                );
                Err(NtfsError::corrupted("attribute list entry points to a missing attribute"))
            }
        }
    }

    /// Re-aim the cursor at the fragment of the current stream that holds
    /// `vcn` and return the stream's type.
    pub(crate) fn position_for_read(&mut self, vcn: u64) -> Result<u32, NtfsError> {
        self.next = self.current;
        match self.list.as_deref() {
            Some(list) => {
                let entry = AttrListEntry::parse(list, self.current)?;
                let mut probe = entry.next_offset();
                while has_record_at(list, probe) {
                    let following = AttrListEntry::parse(list, probe)?;
                    if following.type_code != entry.type_code || following.starting_vcn > vcn {
                        break;
                    }
                    self.next = probe;
                    probe = following.next_offset();
                }
                Ok(entry.type_code)
            }
            None => read_u32(self.base.data(), self.current),
        }
    }
}

/// Decode the attribute at `pos` if one starts there, returning it with
/// the offset of its successor. `end` is the record's used size.
fn next_attribute(record: &[u8], pos: usize, end: usize) -> Result<Option<(AttrHeader, usize)>, NtfsError> {
    let end = end.min(record.len());
    if pos + 4 > end {
        return Ok(None);
    }
    let type_code = read_u32(record, pos)?;
    if type_code == ATTR_TYPE_END {
        return Ok(None);
    }

    let remaining = end - pos;
    if remaining < RESIDENT_HEADER_SIZE {
        return Err(NtfsError::corrupted("attribute header runs past the record"));
    }
    let length = read_u32(record, pos + 0x04)? as usize;
    if length == 0 || length >= remaining {
        debug!(
            "attribute {:#x} at {:#x} has length {:#x}, {:#x} bytes remain",
            type_code, pos, length, remaining
        );
        return Err(NtfsError::corrupted("attribute length is invalid"));
    }

    let header = AttrHeader::parse(record, pos)?;
    Ok(Some((header, pos + length)))
}
