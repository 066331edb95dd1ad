// NTFS reader
// A mounted volume plus its root directory, shared by every open handle

use crate::config::NtfsConfig;
use crate::ntfs::cache::LookupCache;
use crate::ntfs::file::NtfsFile;
use crate::ntfs::handle::{FileHandle, OpenMode};
use crate::ntfs::index::{self, IndexEntryInfo};
use crate::ntfs::info::{self, FileSystemInfo};
use crate::ntfs::structures::MFT_RECORD_ROOT;
use crate::ntfs::volume::Volume;
use log::info;
use openntfs_core::{BlockDevice, FileDevice, NtfsError};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// State that lives from mount until the last handle is dropped.
pub struct MountedVolume {
    volume: Volume,
    root: NtfsFile,
    cache: Mutex<LookupCache>,
}

impl MountedVolume {
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn root(&self) -> &NtfsFile {
        &self.root
    }

    pub(crate) fn cache(&self) -> Result<MutexGuard<'_, LookupCache>, NtfsError> {
        self.cache
            .lock()
            .map_err(|_| NtfsError::OutOfResources("lookup cache lock poisoned".to_string()))
    }
}

/// Read-only access to one NTFS volume.
#[derive(Clone)]
pub struct NtfsReader {
    inner: Arc<MountedVolume>,
}

impl NtfsReader {
    pub fn mount<D: BlockDevice + 'static>(device: D, config: NtfsConfig) -> Result<Self, NtfsError> {
        let volume = Volume::mount(Box::new(device), config)?;

        let root = NtfsFile::open(&volume, MFT_RECORD_ROOT)?;
        if !root.is_directory() {
            return Err(NtfsError::corrupted("root MFT record is not a directory"));
        }

        let geometry = volume.geometry();
        info!(
            "Mounted NTFS volume: {} byte clusters, {} byte FILE records",
            geometry.cluster_size, geometry.file_record_size
        );

        Ok(Self {
            inner: Arc::new(MountedVolume {
                volume,
                root,
                cache: Mutex::new(LookupCache::new()),
            }),
        })
    }

    /// Mount a disk image or raw device node.
    pub fn open_image(path: impl AsRef<Path>, config: NtfsConfig) -> Result<Self, NtfsError> {
        info!("Opening NTFS filesystem on {}", path.as_ref().display());
        Self::mount(FileDevice::open(path)?, config)
    }

    pub fn volume(&self) -> &Volume {
        &self.inner.volume
    }

    /// Handle on the root directory.
    pub fn root(&self) -> FileHandle {
        FileHandle::root(self.inner.clone())
    }

    /// Open `path` read-only, relative to the root.
    pub fn open(&self, path: &str) -> Result<FileHandle, NtfsError> {
        self.root().open(path, OpenMode::Read)
    }

    /// Whole contents of the regular file at `path`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, NtfsError> {
        let mut handle = self.open(path)?;
        if handle.is_directory() {
            return Err(NtfsError::invalid(format!("{} is a directory", path)));
        }
        let size = usize::try_from(handle.size())
            .map_err(|_| NtfsError::OutOfResources(format!("{} does not fit in memory", path)))?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| NtfsError::OutOfResources(format!("{} bytes for {}", size, path)))?;
        data.resize(size, 0);
        let mut done = 0;
        while done < size {
            let n = handle.read(&mut data[done..])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        data.truncate(done);
        Ok(data)
    }

    /// Entries of the directory at `path`, without `.` and `..`.
    pub fn read_dir(&self, path: &str) -> Result<Vec<IndexEntryInfo>, NtfsError> {
        let handle = self.open(path)?;
        if !handle.is_directory() {
            return Err(NtfsError::invalid(format!("{} is not a directory", path)));
        }
        let mut node = handle.node().clone();
        index::list_dir(&self.inner.volume, &mut node)
    }

    pub fn filesystem_info(&self) -> Result<FileSystemInfo, NtfsError> {
        info::filesystem_info(&self.inner.volume)
    }

    pub fn volume_label(&self) -> Result<String, NtfsError> {
        info::read_volume_label(&self.inner.volume)
    }

    /// (hits, misses) of the directory-read cache.
    pub fn cache_stats(&self) -> Result<(u64, u64), NtfsError> {
        Ok(self.inner.cache()?.stats())
    }
}

impl std::fmt::Debug for NtfsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtfsReader")
            .field("volume", &self.inner.volume)
            .finish()
    }
}
