// File handles
// Open/read/seek/info over a mounted volume; every mutating call is refused

use crate::ntfs::cache::LookupKey;
use crate::ntfs::file::NtfsFile;
use crate::ntfs::index::{self, FileType, IndexEntryInfo};
use crate::ntfs::info::{self, FileInfo, FileSystemInfo};
use crate::ntfs::path_resolver::{relative_to_absolute, resolve, split_path};
use crate::ntfs::reader::MountedVolume;
use crate::ntfs::volume::Volume;
use log::{debug, trace};
use openntfs_core::NtfsError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    File,
    FileSystem,
    VolumeLabel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Info {
    File(FileInfo),
    FileSystem(FileSystemInfo),
    VolumeLabel(String),
}

/// An open file or directory. Handles are independent: each keeps its own
/// position, and clones share nothing but the mounted volume.
#[derive(Clone)]
pub struct FileHandle {
    fs: Arc<MountedVolume>,
    /// Absolute, normalized.
    path: String,
    is_dir: bool,
    node: NtfsFile,
    position: u64,
    dir_index: u64,
}

impl FileHandle {
    pub(crate) fn root(fs: Arc<MountedVolume>) -> Self {
        let node = fs.root().clone();
        Self {
            fs,
            path: "/".to_string(),
            is_dir: true,
            node,
            position: 0,
            dir_index: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path component; empty for the root.
    pub fn name(&self) -> &str {
        split_path(&self.path).1
    }

    pub fn is_directory(&self) -> bool {
        self.is_dir
    }

    pub fn node(&self) -> &NtfsFile {
        &self.node
    }

    /// Data size of a regular file, 0 for directories.
    pub fn size(&self) -> u64 {
        if self.is_dir {
            0
        } else {
            self.node.data_size()
        }
    }

    /// Open `name` relative to this handle (its parent when this is a file).
    /// Absolute names start at the root; `\` is accepted as a separator.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<FileHandle, NtfsError> {
        if mode != OpenMode::Read {
            return Err(NtfsError::WriteProtected);
        }

        let name = name.replace('\\', "/");
        if name.is_empty() || name == "." {
            let mut dup = self.clone();
            dup.position = 0;
            dup.dir_index = 0;
            return Ok(dup);
        }

        let joined = if name.starts_with('/') {
            name
        } else if self.is_dir {
            format!("{}/{}", self.path, name)
        } else {
            format!("{}/{}", split_path(&self.path).0, name)
        };
        let path = relative_to_absolute(&joined)?;
        trace!("Opening `{}'", path);

        if path == "/" {
            return Ok(FileHandle::root(self.fs.clone()));
        }

        let volume = self.fs.volume();
        let (mut node, file_type) = resolve(volume, self.fs.root(), &path)?;
        let is_dir = match file_type {
            FileType::Directory => true,
            FileType::Regular => {
                node.load(volume)?;
                false
            }
            FileType::Symlink => {
                return Err(NtfsError::corrupted(format!("`{}' still resolves to a link", path)));
            }
        };

        Ok(FileHandle {
            fs: self.fs.clone(),
            path,
            is_dir,
            node,
            position: 0,
            dir_index: 0,
        })
    }

    /// Regular files: copy up to `buf.len()` bytes from the current position
    /// and advance it. Directories: write the next encoded [`FileInfo`]
    /// record. 0 means end of file or directory.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, NtfsError> {
        if self.is_dir {
            return self.read_dir_record(buf);
        }

        let remaining = self.node.data_size().saturating_sub(self.position);
        let count = remaining.min(buf.len() as u64) as usize;
        if count == 0 {
            return Ok(0);
        }
        self.node.read(self.fs.volume(), &mut buf[..count], self.position)?;
        self.position += count as u64;
        Ok(count)
    }

    /// Next directory entry, decoded. `None` at the end.
    pub fn read_entry(&mut self) -> Result<Option<FileInfo>, NtfsError> {
        if !self.is_dir {
            return Err(NtfsError::invalid(format!("{} is not a directory", self.path)));
        }
        let mut buf = vec![0u8; info::FILE_INFO_HEADER_SIZE + 512 * 2];
        loop {
            match self.read_dir_record(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => return FileInfo::decode(&buf[..n]).map(Some),
                Err(NtfsError::BufferTooSmall { needed }) => buf.resize(needed, 0),
                Err(e) => return Err(e),
            }
        }
    }

    fn read_dir_record(&mut self, buf: &mut [u8]) -> Result<usize, NtfsError> {
        let use_cache = self.fs.volume().config().lookup_cache;
        let key = LookupKey::new(&self.path, buf.len(), self.dir_index);

        if use_cache {
            let mut cache = self.fs.cache()?;
            if let Some(payload) = cache.lookup(&key) {
                let n = payload.len();
                buf[..n].copy_from_slice(payload);
                self.dir_index += 1;
                return Ok(n);
            }
        }

        let volume = self.fs.volume();
        let Some(entry) = index::nth_entry(volume, &mut self.node, self.dir_index)? else {
            return Ok(0);
        };
        let payload = entry_info(volume, &entry)?.encode();
        if payload.len() > buf.len() {
            return Err(NtfsError::BufferTooSmall { needed: payload.len() });
        }

        let n = payload.len();
        buf[..n].copy_from_slice(&payload);
        if use_cache {
            self.fs.cache()?.insert(key, payload);
        }
        self.dir_index += 1;
        Ok(n)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Directories only rewind (position 0). On files `u64::MAX` seeks to
    /// the end; any other position is accepted as-is.
    pub fn set_position(&mut self, position: u64) -> Result<(), NtfsError> {
        if self.is_dir {
            if position != 0 {
                return Err(NtfsError::invalid("directories can only be rewound"));
            }
            self.dir_index = 0;
            self.position = 0;
            return Ok(());
        }

        self.position = if position == u64::MAX {
            self.node.data_size()
        } else {
            position
        };
        Ok(())
    }

    pub fn info(&mut self, kind: InfoKind) -> Result<Info, NtfsError> {
        let volume = self.fs.volume();
        match kind {
            InfoKind::File => {
                let modified = if self.path == "/" {
                    self.node
                        .standard_times(volume)?
                        .map_or(0, |times| times.modification_time)
                } else {
                    self.node.altered_time
                };
                Ok(Info::File(FileInfo::new(
                    self.name(),
                    self.size(),
                    self.is_dir,
                    modified,
                    volume.geometry().cluster_size_u64(),
                )))
            }
            InfoKind::FileSystem => info::filesystem_info(volume).map(Info::FileSystem),
            InfoKind::VolumeLabel => info::read_volume_label(volume).map(Info::VolumeLabel),
        }
    }

    pub fn write(&mut self, _data: &[u8]) -> Result<usize, NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    pub fn set_info(&mut self, _info: &Info) -> Result<(), NtfsError> {
        Err(NtfsError::WriteProtected)
    }

    pub fn flush(&mut self) -> Result<(), NtfsError> {
        Err(NtfsError::AccessDenied)
    }

    /// Closes the handle; nothing is ever deleted.
    pub fn delete(self) -> Result<(), NtfsError> {
        drop(self);
        Err(NtfsError::DeleteFailure)
    }
}

/// Directory-read record for `entry`. Regular files are opened for their
/// data size; when that is refused the index entry's size is used instead.
pub(crate) fn entry_info(volume: &Volume, entry: &IndexEntryInfo) -> Result<FileInfo, NtfsError> {
    let size = match entry.file_type {
        FileType::Regular => {
            let mut node = entry.to_node();
            match node.load(volume) {
                Ok(()) => node.data_size(),
                Err(NtfsError::Unsupported(reason)) => {
                    debug!("Size of `{}' taken from its index entry: {}", entry.name(), reason);
                    entry.file_name.real_size
                }
                Err(e) => return Err(e),
            }
        }
        FileType::Directory | FileType::Symlink => 0,
    };
    Ok(FileInfo::new(
        &entry.name(),
        size,
        entry.file_type == FileType::Directory,
        entry.file_name.altered_time,
        volume.geometry().cluster_size_u64(),
    ))
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("is_dir", &self.is_dir)
            .field("inode", &self.node.inode)
            .field("position", &self.position)
            .field("dir_index", &self.dir_index)
            .finish()
    }
}
