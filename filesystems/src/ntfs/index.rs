// Directory index walker
// Visits the $I30 entries of $INDEX_ROOT, then of every in-use INDX record
// of $INDEX_ALLOCATION

use crate::ntfs::attributes::{AttrForm, FileName};
use crate::ntfs::bytes::{read_file_reference, read_u16, read_u32};
use crate::ntfs::data::{read_attr, read_data};
use crate::ntfs::file::NtfsFile;
use crate::ntfs::mft::{apply_fixup, FileRecord};
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::structures::*;
use crate::ntfs::volume::Volume;
use log::{debug, trace};
use openntfs_core::NtfsError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

/// One usable directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntryInfo {
    pub mft_record: u64,
    pub file_type: FileType,
    /// Every namespace but POSIX compares names case-insensitively.
    pub case_insensitive: bool,
    pub file_name: FileName,
}

impl IndexEntryInfo {
    pub fn name(&self) -> String {
        char::decode_utf16(self.file_name.name.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    pub fn name_matches(&self, wanted: &str) -> bool {
        if self.case_insensitive {
            let stored = self.name();
            stored.chars().flat_map(char::to_uppercase).eq(wanted.chars().flat_map(char::to_uppercase))
        } else {
            self.file_name.name.iter().copied().eq(wanted.encode_utf16())
        }
    }

    pub fn is_dot_entry(&self) -> bool {
        let name = &self.file_name.name;
        let dot = '.' as u16;
        (name.len() == 1 && name[0] == dot) || (name.len() == 2 && name[0] == dot && name[1] == dot)
    }

    pub fn to_node(&self) -> NtfsFile {
        NtfsFile::new(self.mft_record, self.file_name.altered_time)
    }
}

/// Walk the entries at the start of `entries` until the last-entry marker.
/// Returns `Ok(true)` as soon as `visit` does.
fn list_entries<F>(entries: &[u8], visit: &mut F) -> Result<bool, NtfsError>
where
    F: FnMut(&IndexEntryInfo) -> Result<bool, NtfsError>,
{
    let mut pos = 0usize;
    loop {
        let remaining = entries.len().saturating_sub(pos);
        if remaining < INDEX_ENTRY_HEADER_SIZE {
            return Err(NtfsError::corrupted("index entry header runs past its buffer"));
        }
        let flags = read_u16(entries, pos + 0x0C)?;
        if flags & INDEX_ENTRY_LAST != 0 {
            return Ok(false);
        }
        if remaining < INDEX_ENTRY_HEADER_SIZE + FILE_NAME_HEADER_SIZE {
            return Err(NtfsError::corrupted("index entry too short for a file name"));
        }

        let file_name = FileName::parse(entries, pos + INDEX_ENTRY_HEADER_SIZE)?;
        // DOS names reappear under their Win32 spelling
        if !file_name.name.is_empty() && file_name.namespace != NAMESPACE_DOS {
            let file_type = if file_name.is_reparse_point() {
                FileType::Symlink
            } else if file_name.is_directory() {
                FileType::Directory
            } else {
                FileType::Regular
            };
            let info = IndexEntryInfo {
                mft_record: read_file_reference(entries, pos)?,
                file_type,
                case_insensitive: file_name.namespace != NAMESPACE_POSIX,
                file_name,
            };
            if visit(&info)? {
                return Ok(true);
            }
        }

        let length = read_u16(entries, pos + 0x08)? as usize;
        if length == 0 || length > remaining {
            debug!("index entry at {:#x} has length {:#x}, {:#x} remain", pos, length, remaining);
            return Err(NtfsError::corrupted("index entry length is invalid"));
        }
        pos += length;
    }
}

/// Visit every entry of directory `dir` until `visit` returns `true`.
///
/// Returns whether the walk was stopped by the visitor.
pub fn iterate_dir<F>(volume: &Volume, dir: &mut NtfsFile, mut visit: F) -> Result<bool, NtfsError>
where
    F: FnMut(&IndexEntryInfo) -> Result<bool, NtfsError>,
{
    dir.load(volume)?;
    let record = dir.record()?.clone();

    if walk_index_root(volume, &record, &mut visit)? {
        return Ok(true);
    }

    let bitmap = read_index_bitmap(volume, &record)?;
    let allocation = locate_index_allocation(volume, &record)?;
    let (bitmap, mut cursor) = match (bitmap, allocation) {
        (Some(bitmap), Some(cursor)) => (bitmap, cursor),
        (Some(_), None) => {
            return Err(NtfsError::corrupted("$BITMAP without $INDEX_ALLOCATION"));
        }
        (None, _) => return Ok(false),
    };

    let record_size = volume.geometry().index_record_size;
    let mut index_record = vec![0u8; record_size];
    for (byte_index, byte) in bitmap.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) == 0 {
                continue;
            }
            let number = (byte_index * 8 + bit) as u64;
            trace!("directory {:#x}: INDX record {}", dir.inode, number);

            read_attr(volume, &mut cursor, &mut index_record, number * record_size as u64)?;
            apply_fixup(&mut index_record, INDEX_RECORD_MAGIC, volume.geometry().sector_size).map_err(|e| {
                match e {
                    NtfsError::NotFound(_) => NtfsError::corrupted(format!("INDX record {} has a bad signature", number)),
                    other => other,
                }
            })?;

            let entries_offset = read_u32(&index_record, INDEX_RECORD_HEADER_SIZE)? as usize;
            let start = INDEX_RECORD_HEADER_SIZE + entries_offset;
            if start > record_size {
                return Err(NtfsError::corrupted("$INDEX_ALLOCATION entries start past the record"));
            }
            if list_entries(&index_record[start..], &mut visit)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn walk_index_root<F>(volume: &Volume, record: &Arc<FileRecord>, visit: &mut F) -> Result<bool, NtfsError>
where
    F: FnMut(&IndexEntryInfo) -> Result<bool, NtfsError>,
{
    let mut cursor = AttrCursor::new(record.clone(), false)?;
    loop {
        let Some(location) = cursor.find_attr(volume, ATTR_TYPE_INDEX_ROOT)? else {
            debug!("MFT record {:#x}: no $INDEX_ROOT", record.number);
            return Err(NtfsError::corrupted("directory has no $INDEX_ROOT"));
        };
        let bytes = cursor.record_bytes(location.source);
        let header = location.header;
        if !header.is_resident()
            || header.name_length != 4
            || header.name_offset as usize != RESIDENT_HEADER_SIZE
            || !header.name_is(bytes, I30_NAME)?
        {
            continue;
        }

        let value = header.resident_value(bytes)?;
        if read_u32(value, 0)? != ATTR_TYPE_FILE_NAME {
            continue;
        }
        let first_entry = read_u32(value, INDEX_ROOT_HEADER_SIZE)? as usize;
        let start = INDEX_ROOT_HEADER_SIZE + first_entry;
        if start > value.len() {
            return Err(NtfsError::corrupted("$INDEX_ROOT entries start past its value"));
        }
        return list_entries(&value[start..], visit);
    }
}

/// The `$I30` allocation bitmap, if the directory has one.
fn read_index_bitmap(volume: &Volume, record: &Arc<FileRecord>) -> Result<Option<Vec<u8>>, NtfsError> {
    let mut cursor = AttrCursor::new(record.clone(), false)?;
    while let Some(location) = cursor.find_attr(volume, ATTR_TYPE_BITMAP)? {
        let bytes = cursor.record_bytes(location.source);
        if location.header.name_length != 4 || !location.header.name_is(bytes, I30_NAME)? {
            continue;
        }

        let bitmap = match location.header.form {
            AttrForm::Resident { .. } => location.header.resident_value(bytes)?.to_vec(),
            AttrForm::NonResident { real_size, .. } => {
                if real_size > MAX_FILE_SIZE || real_size > volume.geometry().volume_size() {
                    debug!("MFT record {:#x}: index bitmap of {:#x} bytes", record.number, real_size);
                    return Err(NtfsError::corrupted("index bitmap is larger than the volume"));
                }
                let mut bitmap = vec![0u8; real_size as usize];
                read_data(volume, &mut cursor, &location, &mut bitmap, 0)?;
                bitmap
            }
        };
        return Ok(Some(bitmap));
    }
    Ok(None)
}

/// A cursor positioned on the `$I30` `$INDEX_ALLOCATION`.
fn locate_index_allocation(volume: &Volume, record: &Arc<FileRecord>) -> Result<Option<AttrCursor>, NtfsError> {
    let Some((mut cursor, mut location)) =
        AttrCursor::locate(volume, record.clone(), false, ATTR_TYPE_INDEX_ALLOCATION)?
    else {
        return Ok(None);
    };
    loop {
        let bytes = cursor.record_bytes(location.source);
        let header = location.header;
        if !header.is_resident()
            && header.name_length == 4
            && header.name_offset as usize == NONRESIDENT_HEADER_SIZE
            && header.name_is(bytes, I30_NAME)?
        {
            cursor.set_primary(header);
            return Ok(Some(cursor));
        }
        match cursor.find_attr(volume, ATTR_TYPE_INDEX_ALLOCATION)? {
            Some(next) => location = next,
            None => return Ok(None),
        }
    }
}

/// Entry of `dir` called `name`, compared per the entry's namespace.
pub fn find_entry(volume: &Volume, dir: &mut NtfsFile, name: &str) -> Result<Option<IndexEntryInfo>, NtfsError> {
    let mut found = None;
    iterate_dir(volume, dir, |entry| {
        if entry.name_matches(name) {
            found = Some(entry.clone());
            return Ok(true);
        }
        Ok(false)
    })?;
    Ok(found)
}

/// The `index`th entry of `dir`, not counting `.` and `..`.
pub fn nth_entry(volume: &Volume, dir: &mut NtfsFile, index: u64) -> Result<Option<IndexEntryInfo>, NtfsError> {
    let mut remaining = index;
    let mut found = None;
    iterate_dir(volume, dir, |entry| {
        if entry.is_dot_entry() {
            return Ok(false);
        }
        if remaining == 0 {
            found = Some(entry.clone());
            return Ok(true);
        }
        remaining -= 1;
        Ok(false)
    })?;
    Ok(found)
}

/// Every entry of `dir` except `.` and `..`, in index order.
pub fn list_dir(volume: &Volume, dir: &mut NtfsFile) -> Result<Vec<IndexEntryInfo>, NtfsError> {
    let mut entries = Vec::new();
    iterate_dir(volume, dir, |entry| {
        if !entry.is_dot_entry() {
            entries.push(entry.clone());
        }
        Ok(false)
    })?;
    Ok(entries)
}
