// Read-only NTFS engine
pub mod config;
pub mod ntfs;
pub mod ops;

pub use config::NtfsConfig;
pub use ntfs::{FileHandle, FileInfo, FileSystemInfo, FileType, Info, InfoKind, NtfsOps, NtfsReader, OpenMode};
pub use ops::{DirectoryEntry, FileAttributes, FilesystemInfo, FilesystemOps};
