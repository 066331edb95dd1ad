// NTFS boot sector parser
// Derives the per-volume geometry every other layer reads through

use crate::ntfs::bytes::{ensure_slice, read_u16, read_u64, read_u8};
use crate::ntfs::structures::*;
use log::{debug, info};
use openntfs_core::NtfsError;

pub const BOOT_SECTOR_SIZE: usize = 512;
const MIN_SECTOR_SIZE: usize = 256;

const BPB_OEM_ID: usize = 0x03;
const BPB_BYTES_PER_SECTOR: usize = 0x0B;
const BPB_SECTORS_PER_CLUSTER: usize = 0x0D;
const BPB_TOTAL_SECTORS: usize = 0x28;
const BPB_MFT_LCN: usize = 0x30;
const BPB_MFT_MIRR_LCN: usize = 0x38;
const BPB_MFT_RECORD_CLUSTERS: usize = 0x40;
const BPB_INDEX_RECORD_CLUSTERS: usize = 0x44;
const BPB_SERIAL_NUMBER: usize = 0x48;

/// Volume constants computed once at mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub sector_size: usize,
    pub cluster_size: usize,
    pub file_record_size: usize,
    pub index_record_size: usize,
    /// Byte offset of `$MFT` record 0.
    pub first_mft_record: u64,
    pub mft_mirror_lcn: u64,
    pub total_sectors: u64,
    pub serial_number: u64,
}

impl VolumeGeometry {
    pub fn cluster_size_u64(&self) -> u64 {
        self.cluster_size as u64
    }

    pub fn volume_size(&self) -> u64 {
        self.total_sectors.saturating_mul(self.sector_size as u64)
    }
}

/// Parse and validate the BIOS parameter block in `sector`.
pub fn parse_boot_sector(sector: &[u8]) -> Result<VolumeGeometry, NtfsError> {
    let oem = ensure_slice(sector, BPB_OEM_ID, 4)?;
    if oem != NTFS_OEM_ID {
        debug!("Boot sector OEM id {:02X?} is not NTFS", oem);
        return Err(NtfsError::corrupted("BIOS parameter block is corrupted (signature)"));
    }

    let bytes_per_sector = read_u16(sector, BPB_BYTES_PER_SECTOR)? as usize;
    let sectors_per_cluster = read_u8(sector, BPB_SECTORS_PER_CLUSTER)? as usize;
    if !bytes_per_sector.is_power_of_two()
        || bytes_per_sector < MIN_SECTOR_SIZE
        || !sectors_per_cluster.is_power_of_two()
    {
        return Err(NtfsError::corrupted(format!(
            "BIOS parameter block is corrupted ({} bytes/sector, {} sectors/cluster)",
            bytes_per_sector, sectors_per_cluster
        )));
    }

    let sector_size = bytes_per_sector;
    let cluster_size = sectors_per_cluster * sector_size;

    let file_record_size = record_size(read_u8(sector, BPB_MFT_RECORD_CLUSTERS)? as i8, cluster_size)?;
    if file_record_size < sector_size {
        return Err(NtfsError::corrupted("File record is smaller than a sector"));
    }

    let index_record_size =
        record_size(read_u8(sector, BPB_INDEX_RECORD_CLUSTERS)? as i8, cluster_size)?;
    if index_record_size < sector_size {
        return Err(NtfsError::corrupted("Index record is smaller than a sector"));
    }

    if file_record_size > NTFS_MAX_MFT || index_record_size > NTFS_MAX_IDX {
        return Err(NtfsError::corrupted(format!(
            "record sizes {}/{} exceed driver limits",
            file_record_size, index_record_size
        )));
    }

    let mft_lcn = read_u64(sector, BPB_MFT_LCN)?;
    let first_mft_record = mft_lcn
        .checked_mul(cluster_size as u64)
        .ok_or_else(|| NtfsError::corrupted("$MFT LCN overflows"))?;

    let geometry = VolumeGeometry {
        sector_size,
        cluster_size,
        file_record_size,
        index_record_size,
        first_mft_record,
        mft_mirror_lcn: read_u64(sector, BPB_MFT_MIRR_LCN)?,
        total_sectors: read_u64(sector, BPB_TOTAL_SECTORS)?,
        serial_number: read_u64(sector, BPB_SERIAL_NUMBER)?,
    };

    info!(
        "NTFS geometry: sector {}, cluster {}, FILE record {}, INDX record {}, $MFT at {:#x}",
        sector_size, cluster_size, file_record_size, index_record_size, first_mft_record
    );
    Ok(geometry)
}

/// Positive values count clusters; negative values are log2 of a byte size.
fn record_size(clusters: i8, cluster_size: usize) -> Result<usize, NtfsError> {
    let size = if clusters > 0 {
        clusters as usize * cluster_size
    } else {
        let shift = -(clusters as i32);
        if shift >= 31 {
            return Err(NtfsError::corrupted(format!(
                "BIOS parameter block is corrupted (record clusters {})",
                clusters
            )));
        }
        1usize << shift
    };

    if !size.is_power_of_two() {
        return Err(NtfsError::corrupted(format!("record size {} is not a power of two", size)));
    }
    Ok(size)
}
