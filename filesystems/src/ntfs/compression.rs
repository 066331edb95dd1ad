// NTFS LZNT1 decompression
// Compressed $DATA is stored in units of 16 clusters; a unit whose tail is
// sparse holds LZNT1 blocks that expand to 4 KiB each

use crate::ntfs::data_runs::RunList;
use crate::ntfs::structures::*;
use crate::ntfs::volume::Volume;
use log::{debug, trace};
use openntfs_core::NtfsError;

/// Physical clusters backing a compression unit, in VCN order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    lcn: u64,
    count: u64,
}

/// How a compression unit is stored.
#[derive(Debug, PartialEq, Eq)]
enum UnitLayout {
    /// Every cluster sparse: the unit reads as zeros.
    Sparse,
    /// Every cluster allocated: stored as-is.
    Plain(Vec<Extent>),
    /// Leading clusters hold LZNT1 blocks, the rest is sparse.
    Compressed(Vec<Extent>),
}

/// Supplies the physical clusters of one compression unit in order.
trait ClusterSource {
    /// Fill `buf` with the next cluster. `Ok(false)` once the unit has no
    /// physical clusters left.
    fn next_cluster(&mut self, buf: &mut [u8]) -> Result<bool, NtfsError>;
}

/// Clusters read from the volume through a unit's extents.
struct DiskClusters<'v> {
    volume: &'v Volume,
    extents: Vec<Extent>,
    extent: usize,
    cluster_in_extent: u64,
}

impl<'v> DiskClusters<'v> {
    fn new(volume: &'v Volume, extents: Vec<Extent>) -> Self {
        Self {
            volume,
            extents,
            extent: 0,
            cluster_in_extent: 0,
        }
    }
}

impl ClusterSource for DiskClusters<'_> {
    fn next_cluster(&mut self, buf: &mut [u8]) -> Result<bool, NtfsError> {
        let Some(extent) = self.extents.get(self.extent).copied() else {
            return Ok(false);
        };
        let offset = extent
            .lcn
            .checked_add(self.cluster_in_extent)
            .and_then(|lcn| lcn.checked_mul(buf.len() as u64))
            .ok_or_else(|| NtfsError::corrupted("cluster number overflows the volume"))?;
        self.volume.disk_read(offset, buf)?;

        self.cluster_in_extent += 1;
        if self.cluster_in_extent == extent.count {
            self.extent += 1;
            self.cluster_in_extent = 0;
        }
        Ok(true)
    }
}

/// The physical clusters of one compression unit, consumed as a byte
/// stream.
struct CompressedStream<S> {
    source: S,
    cluster: Vec<u8>,
    pos: usize,
}

impl<S: ClusterSource> CompressedStream<S> {
    fn new(source: S, cluster_size: usize) -> Self {
        Self {
            source,
            cluster: vec![0; cluster_size],
            pos: cluster_size,
        }
    }

    /// Load the next cluster once the current one is used up.
    fn refill(&mut self) -> Result<bool, NtfsError> {
        if self.pos < self.cluster.len() {
            return Ok(true);
        }
        if !self.source.next_cluster(&mut self.cluster)? {
            return Ok(false);
        }
        self.pos = 0;
        Ok(true)
    }

    fn byte(&mut self) -> Result<u8, NtfsError> {
        if !self.refill()? {
            return Err(NtfsError::corrupted("compressed data runs past its compression unit"));
        }
        let b = self.cluster[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn two_bytes(&mut self) -> Result<u16, NtfsError> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// The next block header, or `None` when the blocks fill the unit's
    /// clusters exactly.
    fn block_header(&mut self) -> Result<Option<u16>, NtfsError> {
        if !self.refill()? {
            return Ok(None);
        }
        self.two_bytes().map(Some)
    }
}

/// Outcome of decoding one block.
#[derive(Debug, PartialEq, Eq)]
enum Block {
    Decoded,
    /// A zero header: no more blocks in this unit.
    EndOfUnit,
}

/// Split a back-reference into (distance - 1, length - 3). The split moves
/// with the decoded position: the further in, the more bits the distance
/// gets.
fn decode_token(token: u16, position: usize) -> (usize, usize) {
    let mut length_mask: u16 = 0x0FFF;
    let mut distance_shift = 12;
    let mut i = position - 1;
    while i >= 0x10 {
        i >>= 1;
        length_mask >>= 1;
        distance_shift -= 1;
    }
    ((token >> distance_shift) as usize, (token & length_mask) as usize)
}

/// Expand one LZNT1 block into `dest`, which is one zeroed 4 KiB block.
fn decompress_block<S: ClusterSource>(stream: &mut CompressedStream<S>, dest: &mut [u8]) -> Result<Block, NtfsError> {
    let header = match stream.block_header()? {
        None | Some(0) => return Ok(Block::EndOfUnit),
        Some(header) => header,
    };
    let mut remaining = (header & BLOCK_LENGTH_MASK) as usize + 1;

    if header & BLOCK_IS_COMPRESSED == 0 {
        if remaining != COMPRESSION_BLOCK {
            debug!("uncompressed LZNT1 block of {} bytes", remaining);
            return Err(NtfsError::corrupted("uncompressed block must fill 4096 bytes"));
        }
        for slot in dest.iter_mut().take(remaining) {
            *slot = stream.byte()?;
        }
        return Ok(Block::Decoded);
    }

    let mut position = 0usize;
    let mut tags = 0u8;
    let mut tokens = 0u32;
    while remaining > 0 {
        if tokens == 0 {
            tags = stream.byte()?;
            tokens = 8;
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }

        if tags & 1 != 0 {
            if remaining < 2 {
                return Err(NtfsError::corrupted("back-reference truncated by block end"));
            }
            let token = stream.two_bytes()?;
            remaining -= 2;
            if position == 0 {
                return Err(NtfsError::corrupted("back-reference at the start of a block"));
            }
            let (delta, length) = decode_token(token, position);
            let length = length + 3;
            if delta > position - 1 || length >= COMPRESSION_BLOCK || position + length > COMPRESSION_BLOCK {
                debug!(
                    "back-reference {:#06x} at {:#x}: distance {}, length {}",
                    token,
                    position,
                    delta + 1,
                    length
                );
                return Err(NtfsError::corrupted("back-reference out of bounds"));
            }
            // the source may overlap the bytes being written
            for _ in 0..length {
                dest[position] = dest[position - delta - 1];
                position += 1;
            }
        } else {
            if position >= COMPRESSION_BLOCK {
                return Err(NtfsError::corrupted("literal past the end of a block"));
            }
            dest[position] = stream.byte()?;
            position += 1;
            remaining -= 1;
        }

        tags >>= 1;
        tokens -= 1;
    }

    Ok(Block::Decoded)
}

/// Map the 16 clusters of the unit starting at `unit_vcn`.
fn unit_layout(runlist: &mut RunList<'_>, unit_vcn: u64) -> Result<UnitLayout, NtfsError> {
    let mut extents: Vec<Extent> = Vec::new();
    let mut physical = 0u64;
    let mut seen_sparse = false;

    for vcn in unit_vcn..unit_vcn + COMPRESSION_UNIT_CLUSTERS {
        match runlist.lcn(vcn)? {
            None => seen_sparse = true,
            Some(_) if seen_sparse => {
                return Err(NtfsError::corrupted("compression unit has clusters after its sparse tail"));
            }
            Some(lcn) => {
                physical += 1;
                match extents.last_mut() {
                    Some(last) if last.lcn.checked_add(last.count) == Some(lcn) => last.count += 1,
                    _ => extents.push(Extent { lcn, count: 1 }),
                }
            }
        }
    }

    Ok(match physical {
        0 => UnitLayout::Sparse,
        COMPRESSION_UNIT_CLUSTERS => UnitLayout::Plain(extents),
        _ => UnitLayout::Compressed(extents),
    })
}

/// Fill `unit` (one whole compression unit, zeroed) from disk. Only the
/// first `blocks` LZNT1 blocks of a compressed unit are decoded.
fn read_unit(
    volume: &Volume,
    runlist: &mut RunList<'_>,
    unit_vcn: u64,
    unit: &mut [u8],
    blocks: usize,
) -> Result<(), NtfsError> {
    let cluster_size = volume.geometry().cluster_size;
    match unit_layout(runlist, unit_vcn)? {
        UnitLayout::Sparse => {
            trace!("compression unit at VCN {:#x} is sparse", unit_vcn);
        }
        UnitLayout::Plain(extents) => {
            let mut pos = 0usize;
            for extent in extents {
                let len = extent.count as usize * cluster_size;
                let offset = extent
                    .lcn
                    .checked_mul(cluster_size as u64)
                    .ok_or_else(|| NtfsError::corrupted("cluster number overflows the volume"))?;
                volume.disk_read(offset, &mut unit[pos..pos + len])?;
                pos += len;
            }
        }
        UnitLayout::Compressed(extents) => {
            trace!(
                "compression unit at VCN {:#x}: {} physical extents",
                unit_vcn,
                extents.len()
            );
            let mut stream = CompressedStream::new(DiskClusters::new(volume, extents), cluster_size);
            for block in unit.chunks_mut(COMPRESSION_BLOCK).take(blocks) {
                if decompress_block(&mut stream, block)? == Block::EndOfUnit {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Read `dest.len()` bytes at `offset` of a compressed stream, one
/// compression unit at a time.
pub fn read_compressed(
    volume: &Volume,
    runlist: &mut RunList<'_>,
    dest: &mut [u8],
    offset: u64,
) -> Result<(), NtfsError> {
    let cluster_size = volume.geometry().cluster_size_u64();
    let unit_bytes = (COMPRESSION_UNIT_CLUSTERS * cluster_size) as usize;
    let mut unit = vec![0u8; unit_bytes];

    let mut done = 0usize;
    while done < dest.len() {
        let pos = offset + done as u64;
        let unit_index = pos / unit_bytes as u64;
        let within = (pos % unit_bytes as u64) as usize;

        let count = (unit_bytes - within).min(dest.len() - done);
        let blocks = (within + count).div_ceil(COMPRESSION_BLOCK);

        unit.fill(0);
        read_unit(volume, runlist, unit_index * COMPRESSION_UNIT_CLUSTERS, &mut unit, blocks)?;

        dest[done..done + count].copy_from_slice(&unit[within..within + count]);
        done += count;
    }
    Ok(())
}
