// NTFS FilesystemOps implementation
use crate::config::NtfsConfig;
use crate::ntfs::handle::{entry_info, FileHandle, Info, InfoKind};
use crate::ntfs::index::FileType;
use crate::ntfs::info::FileInfo;
use crate::ntfs::reader::NtfsReader;
use crate::ntfs::timestamps::EfiTime;
use crate::ops::{DirectoryEntry, FileAttributes, FilesystemInfo, FilesystemOps};
use openntfs_core::{BlockDevice, NtfsError};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Longest NTFS file name, in UTF-16 units.
const MAX_FILENAME_LENGTH: u32 = 255;

/// NTFS filesystem operations wrapper
pub struct NtfsOps {
    reader: Mutex<Option<NtfsReader>>,
    config: NtfsConfig,
}

impl NtfsOps {
    pub fn new(config: NtfsConfig) -> Self {
        NtfsOps {
            reader: Mutex::new(None),
            config,
        }
    }

    fn reader(&self) -> Result<NtfsReader, NtfsError> {
        let guard = self
            .reader
            .lock()
            .map_err(|_| NtfsError::OutOfResources("reader lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| NtfsError::invalid("filesystem not initialized"))
    }

    fn open(&self, path: &Path) -> Result<FileHandle, NtfsError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| NtfsError::invalid(format!("path {} is not UTF-8", path.display())))?;
        self.reader()?.open(path_str)
    }
}

impl Default for NtfsOps {
    fn default() -> Self {
        Self::new(NtfsConfig::default())
    }
}

/// Seconds since the Unix epoch for an EFI-style time, `None` before 1970
/// or when the time is not a valid date.
fn unix_seconds(time: &EfiTime) -> Option<u64> {
    let datetime = time.to_datetime()?;
    u64::try_from(datetime.and_utc().timestamp()).ok()
}

fn to_attributes(info: &FileInfo, is_symlink: bool) -> FileAttributes {
    let is_directory = info.is_directory();
    FileAttributes {
        size: info.file_size,
        is_directory,
        is_file: !is_directory && !is_symlink,
        is_symlink,
        created: unix_seconds(&info.create_time),
        modified: unix_seconds(&info.modification_time),
        accessed: unix_seconds(&info.last_access_time),
        permissions: if is_directory { 0o555 } else { 0o444 },
    }
}

impl FilesystemOps for NtfsOps {
    fn filesystem_type(&self) -> &str {
        "ntfs"
    }

    fn init(&mut self, device: Arc<dyn BlockDevice>) -> Result<(), NtfsError> {
        let reader = NtfsReader::mount(device, self.config.clone())?;
        *self
            .reader
            .lock()
            .map_err(|_| NtfsError::OutOfResources("reader lock poisoned".to_string()))? = Some(reader);
        Ok(())
    }

    fn statfs(&self) -> Result<FilesystemInfo, NtfsError> {
        let info = self.reader()?.filesystem_info()?;
        Ok(FilesystemInfo {
            total_space: info.volume_size,
            free_space: info.free_space,
            block_size: info.block_size,
            max_filename_length: MAX_FILENAME_LENGTH,
            filesystem_type: "ntfs".to_string(),
            volume_label: (!info.volume_label.is_empty()).then_some(info.volume_label),
            is_readonly: info.read_only,
        })
    }

    fn stat(&self, path: &Path) -> Result<FileAttributes, NtfsError> {
        let mut handle = self.open(path)?;
        match handle.info(InfoKind::File)? {
            Info::File(info) => Ok(to_attributes(&info, false)),
            _ => Err(NtfsError::invalid("unexpected info kind")),
        }
    }

    fn readdir(&self, path: &Path) -> Result<Vec<DirectoryEntry>, NtfsError> {
        let reader = self.reader()?;
        let handle = self.open(path)?;
        reader
            .read_dir(handle.path())?
            .iter()
            .map(|entry| {
                let info = entry_info(reader.volume(), entry)?;
                Ok(DirectoryEntry {
                    attributes: to_attributes(&info, entry.file_type == FileType::Symlink),
                    name: info.file_name,
                })
            })
            .collect()
    }

    fn read(&self, path: &Path, offset: u64, size: u32) -> Result<Vec<u8>, NtfsError> {
        let mut handle = self.open(path)?;
        if handle.is_directory() {
            return Err(NtfsError::invalid(format!("{} is a directory", path.display())));
        }
        handle.set_position(offset)?;

        let mut data = vec![0u8; size as usize];
        let mut done = 0;
        while done < data.len() {
            let n = handle.read(&mut data[done..])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        data.truncate(done);
        Ok(data)
    }
}
