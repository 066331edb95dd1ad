// Bounds-checked little-endian access to raw record buffers.
// Every on-disk offset passes through here before it is trusted.

use byteorder::{ByteOrder, LittleEndian};
use openntfs_core::NtfsError;

/// Borrow `len` bytes at `offset`, or report corruption.
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], NtfsError> {
    let end = offset.checked_add(len).ok_or_else(|| {
        NtfsError::corrupted(format!("range {:#x}+{:#x} overflows", offset, len))
    })?;
    data.get(offset..end).ok_or_else(|| {
        NtfsError::corrupted(format!(
            "range {:#x}..{:#x} exceeds buffer of {:#x} bytes",
            offset,
            end,
            data.len()
        ))
    })
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, NtfsError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

pub fn read_u16(data: &[u8], offset: usize) -> Result<u16, NtfsError> {
    Ok(LittleEndian::read_u16(ensure_slice(data, offset, 2)?))
}

pub fn read_u32(data: &[u8], offset: usize) -> Result<u32, NtfsError> {
    Ok(LittleEndian::read_u32(ensure_slice(data, offset, 4)?))
}

pub fn read_u64(data: &[u8], offset: usize) -> Result<u64, NtfsError> {
    Ok(LittleEndian::read_u64(ensure_slice(data, offset, 8)?))
}

/// 48-bit MFT record number of a file reference.
pub fn read_file_reference(data: &[u8], offset: usize) -> Result<u64, NtfsError> {
    Ok(LittleEndian::read_u48(ensure_slice(data, offset, 6)?))
}

/// Read `units` UTF-16LE code units.
pub fn read_utf16(data: &[u8], offset: usize, units: usize) -> Result<Vec<u16>, NtfsError> {
    let bytes = ensure_slice(data, offset, units * 2)?;
    Ok(bytes.chunks_exact(2).map(LittleEndian::read_u16).collect())
}

pub fn utf16_to_string(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// A window over a record: the current offset and how much of the buffer
/// is still considered valid from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub remaining: usize,
}

impl Window {
    pub fn new(offset: usize, remaining: usize) -> Self {
        Self { offset, remaining }
    }

    /// Require `len` bytes to be available at the current offset.
    pub fn require(&self, len: usize, what: &str) -> Result<(), NtfsError> {
        if self.remaining < len {
            return Err(NtfsError::corrupted(format!(
                "{} needs {:#x} bytes at {:#x}, only {:#x} left",
                what, len, self.offset, self.remaining
            )));
        }
        Ok(())
    }

    pub fn advance(&mut self, len: usize) -> Result<(), NtfsError> {
        self.require(len, "advance")?;
        self.offset += len;
        self.remaining -= len;
        Ok(())
    }

    /// The window's bytes within `data`, clipped to the buffer.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], NtfsError> {
        ensure_slice(data, self.offset, self.remaining)
    }
}
