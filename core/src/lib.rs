pub mod device;
pub mod error;

pub use device::{BlockDevice, DeviceGeometry, FileDevice, MemoryDevice, DEFAULT_BLOCK_SIZE};
pub use error::NtfsError;
