// Block device boundary consumed by the NTFS engine.
// Reads are synchronous and whole-buffer; a short read is an error.

use crate::NtfsError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, trace};

pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Media geometry reported by a device. Only used for filesystem-info
/// reporting, never for parsing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGeometry {
    pub block_size: u32,
    pub block_count: u64,
}

impl DeviceGeometry {
    pub fn size_bytes(&self) -> u64 {
        self.block_count.saturating_mul(self.block_size as u64)
    }
}

/// Raw byte-addressed read access to a volume.
pub trait BlockDevice: Send + Sync {
    /// Fill `buf` from absolute byte `offset`. Partial reads are failures.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError>;

    fn geometry(&self) -> DeviceGeometry;
}

impl<T: BlockDevice + ?Sized> BlockDevice for std::sync::Arc<T> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError> {
        (**self).read_at(offset, buf)
    }

    fn geometry(&self) -> DeviceGeometry {
        (**self).geometry()
    }
}

/// A disk image or raw device node opened read-only.
pub struct FileDevice {
    path: PathBuf,
    file: Mutex<File>,
    geometry: DeviceGeometry,
}

impl FileDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NtfsError> {
        Self::open_with_block_size(path, DEFAULT_BLOCK_SIZE)
    }

    pub fn open_with_block_size(path: impl AsRef<Path>, block_size: u32) -> Result<Self, NtfsError> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(NtfsError::invalid(format!("block size {} is not a power of two", block_size)));
        }
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        // Device nodes report a zero metadata length, so ask the file itself.
        let len = file.seek(SeekFrom::End(0))?;
        debug!("Opened {} ({} bytes)", path.display(), len);

        Ok(Self {
            path,
            file: Mutex::new(file),
            geometry: DeviceGeometry {
                block_size,
                block_count: len / block_size as u64,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError> {
        trace!("read {} bytes at {:#x}", buf.len(), offset);
        let mut file = self
            .file
            .lock()
            .map_err(|_| NtfsError::DeviceError("device lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }
}

/// An image held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    block_size: u32,
}

impl MemoryDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, block_size: DEFAULT_BLOCK_SIZE }
    }

    pub fn with_block_size(data: Vec<u8>, block_size: u32) -> Self {
        Self { data, block_size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError> {
        let start = usize::try_from(offset)
            .map_err(|_| NtfsError::DeviceError(format!("offset {:#x} out of range", offset)))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                NtfsError::DeviceError(format!(
                    "read of {} bytes at {:#x} past end of {}-byte image",
                    buf.len(),
                    offset,
                    self.data.len()
                ))
            })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn geometry(&self) -> DeviceGeometry {
        DeviceGeometry {
            block_size: self.block_size,
            block_count: self.data.len() as u64 / self.block_size as u64,
        }
    }
}
