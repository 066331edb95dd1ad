// Reparse point targets
// Symbolic links and mount points carry their target as a UTF-16 path

use crate::ntfs::bytes::{read_u16, read_u32};
use crate::ntfs::data::read_attr;
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::structures::*;
use crate::ntfs::volume::Volume;
use log::debug;
use openntfs_core::NtfsError;
use std::sync::Arc;

/// Decoded `$REPARSE_POINT` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReparseHeader {
    pub tag: u32,
    pub data_length: u16,
    pub substitute_offset: u16,
    pub substitute_length: u16,
    pub print_offset: u16,
    pub print_length: u16,
}

impl ReparseHeader {
    pub fn parse(raw: &[u8]) -> Result<Self, NtfsError> {
        Ok(Self {
            tag: read_u32(raw, 0x00)?,
            data_length: read_u16(raw, 0x04)?,
            substitute_offset: read_u16(raw, 0x08)?,
            substitute_length: read_u16(raw, 0x0A)?,
            print_offset: read_u16(raw, 0x0C)?,
            print_length: read_u16(raw, 0x0E)?,
        })
    }

    /// Stream offset of the substitute name. Symbolic links keep a flags
    /// word ahead of their path buffer; mount points do not.
    pub fn substitute_name_offset(&self) -> Result<u64, NtfsError> {
        let buffer = match self.tag {
            REPARSE_TAG_SYMLINK => REPARSE_HEADER_SIZE + 4,
            REPARSE_TAG_MOUNT_POINT => REPARSE_HEADER_SIZE,
            other => {
                return Err(NtfsError::Unsupported(format!("reparse tag {:#010x}", other)));
            }
        };
        Ok(buffer as u64 + self.substitute_offset as u64)
    }
}

/// Turn a substitute name into a volume path: `\` becomes `/`, and with
/// `strip_dos_device` the `\??\X:` prefix is dropped.
pub fn normalize_target(units: &[u16], strip_dos_device: bool) -> String {
    let target: String = char::decode_utf16(units.iter().copied())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    if strip_dos_device {
        if let Some(rest) = target.strip_prefix("/??/") {
            let mut chars = rest.chars();
            if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
                if drive.is_ascii_alphabetic() {
                    let path = chars.as_str();
                    return if path.is_empty() { "/".to_string() } else { path.to_string() };
                }
            }
        }
    }
    target
}

/// Target path of the symbolic link or mount point in FILE record `inode`.
pub fn read_symlink(volume: &Volume, inode: u64) -> Result<String, NtfsError> {
    let record = Arc::new(volume.read_mft_record(inode)?);
    let (mut cursor, _) = AttrCursor::locate(volume, record, false, ATTR_TYPE_REPARSE_POINT)?
        .ok_or_else(|| NtfsError::corrupted(format!("MFT record {:#x} has no reparse point", inode)))?;

    let mut raw = [0u8; REPARSE_HEADER_SIZE];
    read_attr(volume, &mut cursor, &mut raw, 0)?;
    let header = ReparseHeader::parse(&raw)?;
    let offset = header.substitute_name_offset()?;

    let mut name = vec![0u8; header.substitute_length as usize];
    read_attr(volume, &mut cursor, &mut name, offset)?;
    let units: Vec<u16> = name.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();

    let target = normalize_target(&units, volume.config().strip_dos_device_prefix);
    debug!("MFT record {:#x} links to {}", inode, target);
    if target.is_empty() {
        return Err(NtfsError::invalid("symbolic link leads nowhere"));
    }
    Ok(target)
}
