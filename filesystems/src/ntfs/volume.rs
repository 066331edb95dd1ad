// Mounted volume context
// Owns the device, the geometry and $MFT record 0; every record read goes
// through here

use crate::config::NtfsConfig;
use crate::ntfs::boot_sector::{parse_boot_sector, VolumeGeometry, BOOT_SECTOR_SIZE};
use crate::ntfs::data;
use crate::ntfs::mft::FileRecord;
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::structures::*;
use log::{debug, trace};
use openntfs_core::{BlockDevice, DeviceGeometry, NtfsError};
use std::sync::Arc;

pub struct Volume {
    device: Box<dyn BlockDevice>,
    geometry: VolumeGeometry,
    config: NtfsConfig,
    mft: Arc<FileRecord>,
    /// Cursor positioned on `$MFT`'s `$DATA`, cloned for each record read.
    mft_data: Option<AttrCursor>,
}

impl Volume {
    /// Read the boot sector and `$MFT` record 0 and locate the `$MFT` data
    /// stream.
    pub fn mount(device: Box<dyn BlockDevice>, config: NtfsConfig) -> Result<Self, NtfsError> {
        config.validate()?;

        let mut sector = [0u8; BOOT_SECTOR_SIZE];
        device.read_at(0, &mut sector)?;
        let geometry = parse_boot_sector(&sector)?;

        let mut raw = vec![0u8; geometry.file_record_size];
        device.read_at(geometry.first_mft_record, &mut raw)?;
        let mft = FileRecord::from_disk(MFT_RECORD_MFT, raw, geometry.sector_size)?;
        if !mft.header.is_in_use() {
            return Err(NtfsError::corrupted("$MFT record 0 is not in use"));
        }

        let mut volume = Self {
            device,
            geometry,
            config,
            mft: Arc::new(mft),
            mft_data: None,
        };

        let (cursor, location) = AttrCursor::locate(&volume, volume.mft.clone(), true, ATTR_TYPE_DATA)?
            .ok_or_else(|| NtfsError::corrupted("$MFT has no $DATA attribute"))?;
        if location.header.is_resident() {
            return Err(NtfsError::corrupted("$MFT data is resident"));
        }
        volume.mft_data = Some(cursor);

        debug!(
            "$MFT loaded: {} byte clusters, {} byte FILE records, {} bytes of $MFT",
            geometry.cluster_size,
            geometry.file_record_size,
            location.header.data_size()
        );
        Ok(volume)
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &NtfsConfig {
        &self.config
    }

    pub fn device_geometry(&self) -> DeviceGeometry {
        self.device.geometry()
    }

    pub fn mft_record_zero(&self) -> &Arc<FileRecord> {
        &self.mft
    }

    /// Absolute byte read from the device.
    pub fn disk_read(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError> {
        trace!("disk read {:#x}+{:#x}", offset, buf.len());
        self.device.read_at(offset, buf)
    }

    /// Read and fix up FILE record `number` through the `$MFT` data stream.
    pub fn read_mft_record(&self, number: u64) -> Result<FileRecord, NtfsError> {
        if number == MFT_RECORD_MFT {
            return Ok(self.mft.as_ref().clone());
        }
        let mut cursor = self
            .mft_data
            .clone()
            .ok_or_else(|| NtfsError::corrupted("$MFT data stream is not located yet"))?;

        let size = self.geometry.file_record_size;
        let offset = number
            .checked_mul(size as u64)
            .ok_or_else(|| NtfsError::corrupted(format!("MFT record number {} is out of range", number)))?;
        let mut raw = vec![0u8; size];
        data::read_attr(self, &mut cursor, &mut raw, offset)?;
        FileRecord::from_disk(number, raw, self.geometry.sector_size)
    }

    /// Read an extension record of `$MFT` itself, mapping it through the
    /// first `$DATA` fragment held in record 0.
    pub(crate) fn read_mft_record_bootstrap(&self, number: u64) -> Result<FileRecord, NtfsError> {
        let mut cursor = AttrCursor::new(self.mft.clone(), true)?;
        let location = cursor
            .find_in_record(ATTR_TYPE_DATA)?
            .ok_or_else(|| NtfsError::corrupted("$MFT record 0 holds no $DATA fragment"))?;

        let size = self.geometry.file_record_size;
        let offset = number
            .checked_mul(size as u64)
            .ok_or_else(|| NtfsError::corrupted(format!("MFT record number {} is out of range", number)))?;
        debug!("reading $MFT extension record {} through record 0", number);

        let mut raw = vec![0u8; size];
        data::read_data_detached(self, self.mft.data(), &location.header, &mut raw, offset)?;
        FileRecord::from_disk(number, raw, self.geometry.sector_size)
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("geometry", &self.geometry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
