// NTFS filesystem support module
// Read-only: every on-disk structure is parsed, nothing is ever written

pub mod structures;
pub mod bytes;
pub mod boot_sector;
pub mod mft;
pub mod attributes;
pub mod attribute_list;
pub mod resolver;
pub mod data_runs;
pub mod compression;
pub mod data;
pub mod volume;
pub mod file;
pub mod index;
pub mod reparse;
pub mod path_resolver;
pub mod cache;
pub mod timestamps;
pub mod info;
pub mod handle;
pub mod reader;
pub mod ops;

// Re-export main types
pub use file::NtfsFile;
pub use handle::{FileHandle, Info, InfoKind, OpenMode};
pub use index::{FileType, IndexEntryInfo};
pub use info::{FileInfo, FileSystemInfo};
pub use ops::NtfsOps;
pub use reader::NtfsReader;
pub use volume::Volume;
