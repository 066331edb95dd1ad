// Path-oriented filesystem operations
// A small synchronous interface for tools that address files by path
// rather than through handles

use openntfs_core::{BlockDevice, NtfsError};
use std::path::Path;
use std::sync::Arc;

/// File attributes returned by stat operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: u64,
    pub is_directory: bool,
    pub is_file: bool,
    pub is_symlink: bool,
    pub created: Option<u64>,  // Unix timestamp
    pub modified: Option<u64>, // Unix timestamp
    pub accessed: Option<u64>, // Unix timestamp
    pub permissions: u32,      // Unix-style permissions
}

/// Directory entry returned by readdir operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub attributes: FileAttributes,
}

/// Filesystem information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemInfo {
    pub total_space: u64,
    pub free_space: u64,
    pub block_size: u32,
    pub max_filename_length: u32,
    pub filesystem_type: String,
    pub volume_label: Option<String>,
    pub is_readonly: bool,
}

/// Core filesystem operations trait
/// All operations are synchronous
pub trait FilesystemOps: Send + Sync {
    /// Mount the filesystem found on `device`
    fn init(&mut self, device: Arc<dyn BlockDevice>) -> Result<(), NtfsError>;

    fn statfs(&self) -> Result<FilesystemInfo, NtfsError>;

    fn stat(&self, path: &Path) -> Result<FileAttributes, NtfsError>;

    /// List directory contents, without `.` and `..`
    fn readdir(&self, path: &Path) -> Result<Vec<DirectoryEntry>, NtfsError>;

    /// Read up to `size` bytes at `offset`; shorter at end of file
    fn read(&self, path: &Path, offset: u64, size: u32) -> Result<Vec<u8>, NtfsError>;

    fn write(&mut self, _path: &Path, _offset: u64, _data: &[u8]) -> Result<u32, NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn create(&mut self, _path: &Path, _mode: u32) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn mkdir(&mut self, _path: &Path, _mode: u32) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn unlink(&mut self, _path: &Path) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn rmdir(&mut self, _path: &Path) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn rename(&mut self, _from: &Path, _to: &Path) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    fn truncate(&mut self, _path: &Path, _size: u64) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    /// Flush any pending writes
    fn sync(&mut self) -> Result<(), NtfsError> {
        Ok(())
    }

    fn is_readonly(&self) -> bool {
        true
    }

    /// Filesystem type name, e.g. "ntfs"
    fn filesystem_type(&self) -> &str;
}
