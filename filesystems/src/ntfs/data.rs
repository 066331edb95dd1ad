// Attribute data reader
// Serves byte ranges of resident and non-resident streams

use crate::ntfs::attributes::{AttrForm, AttrHeader};
use crate::ntfs::compression;
use crate::ntfs::data_runs::{Continuation, RunList};
use crate::ntfs::resolver::{AttrCursor, AttrLocation};
use crate::ntfs::structures::*;
use crate::ntfs::volume::Volume;
use log::{debug, trace};
use openntfs_core::NtfsError;

/// What a non-resident read needs once the attribute's record is no
/// longer borrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamPlan {
    pub runs: Vec<u8>,
    pub starting_vcn: u64,
    pub attr_type: u32,
    pub initialized_size: u64,
    pub compressed: bool,
}

/// Read `dest.len()` bytes at `offset` from the located attribute.
///
/// Non-resident streams spanning several FILE records continue through
/// `cursor`'s attribute list.
pub fn read_data(
    volume: &Volume,
    cursor: &mut AttrCursor,
    location: &AttrLocation,
    dest: &mut [u8],
    offset: u64,
) -> Result<(), NtfsError> {
    if dest.is_empty() {
        return Ok(());
    }
    let record = cursor.record_bytes(location.source);
    if location.header.is_resident() {
        return read_resident(record, &location.header, dest, offset);
    }

    let plan = prepare(
        record,
        &location.header,
        cursor.primary(),
        dest.len(),
        offset,
        volume.geometry().cluster_size_u64(),
        cursor.is_mft_file(),
    )?;
    let runlist = RunList::new(plan.runs.clone(), plan.starting_vcn, plan.attr_type)
        .with_continuation(Continuation { volume, cursor });
    execute(volume, &plan, runlist, dest, offset)
}

/// Read from an attribute whose runs all live in `record`. Used for
/// attribute lists and for `$MFT` extension records.
pub fn read_data_detached(
    volume: &Volume,
    record: &[u8],
    header: &AttrHeader,
    dest: &mut [u8],
    offset: u64,
) -> Result<(), NtfsError> {
    if dest.is_empty() {
        return Ok(());
    }
    if header.is_resident() {
        return read_resident(record, header, dest, offset);
    }
    let plan = prepare(
        record,
        header,
        None,
        dest.len(),
        offset,
        volume.geometry().cluster_size_u64(),
        true,
    )?;
    let runlist = RunList::new(plan.runs.clone(), plan.starting_vcn, plan.attr_type);
    execute(volume, &plan, runlist, dest, offset)
}

/// Read from the stream `cursor` was located on, picking the fragment that
/// maps `offset` when the stream is split across records.
pub fn read_attr(volume: &Volume, cursor: &mut AttrCursor, dest: &mut [u8], offset: u64) -> Result<(), NtfsError> {
    let saved = cursor.mark();
    let result = read_attr_at(volume, cursor, dest, offset);
    cursor.restore(saved);
    result
}

fn read_attr_at(volume: &Volume, cursor: &mut AttrCursor, dest: &mut [u8], offset: u64) -> Result<(), NtfsError> {
    let cluster_size = volume.geometry().cluster_size_u64();
    let mut vcn = offset / cluster_size;
    if cluster_size <= COMPRESSION_BLOCK as u64 {
        vcn &= !(COMPRESSION_UNIT_CLUSTERS - 1);
    }

    let type_code = cursor.position_for_read(vcn)?;
    match cursor.find_attr(volume, type_code)? {
        Some(location) => read_data(volume, cursor, &location, dest, offset),
        None => Err(NtfsError::corrupted(format!(
            "attribute {:#x} disappeared from its cursor",
            type_code
        ))),
    }
}

pub(crate) fn read_resident(record: &[u8], header: &AttrHeader, dest: &mut [u8], offset: u64) -> Result<(), NtfsError> {
    let value = header.resident_value(record)?;
    let end = offset
        .checked_add(dest.len() as u64)
        .filter(|&end| end <= value.len() as u64)
        .ok_or_else(|| {
            debug!(
                "resident read {:#x}+{:#x} past value of {:#x}",
                offset,
                dest.len(),
                value.len()
            );
            NtfsError::corrupted("read past the end of a resident attribute")
        })?;
    dest.copy_from_slice(&value[offset as usize..end as usize]);
    Ok(())
}

/// Validate a non-resident read and copy out the fragment's run list.
///
/// Sizes come from the first fragment: later fragments carry zero sizes.
pub(crate) fn prepare(
    record: &[u8],
    header: &AttrHeader,
    primary: Option<AttrHeader>,
    len: usize,
    offset: u64,
    cluster_size: u64,
    bootstrap: bool,
) -> Result<StreamPlan, NtfsError> {
    let AttrForm::NonResident {
        starting_vcn,
        data_runs_offset,
        compression_unit,
        ..
    } = header.form
    else {
        return Err(NtfsError::corrupted("expected a non-resident attribute"));
    };

    let sizes = match primary {
        Some(primary) if starting_vcn != 0 && primary.type_code == header.type_code => primary,
        _ => *header,
    };
    let AttrForm::NonResident {
        allocated_size,
        real_size,
        initialized_size,
        ..
    } = sizes.form
    else {
        return Err(NtfsError::corrupted("first fragment of a stream is resident"));
    };

    let runs_start = header.offset + data_runs_offset as usize;
    let runs_end = header.offset + header.length as usize;
    if (data_runs_offset as usize) < NONRESIDENT_HEADER_SIZE
        || data_runs_offset as u32 >= header.length
        || runs_end > record.len()
    {
        return Err(NtfsError::corrupted(format!(
            "data runs at {:#x} lie outside attribute of {:#x} bytes",
            data_runs_offset, header.length
        )));
    }
    if real_size > allocated_size {
        return Err(NtfsError::corrupted("attribute real size exceeds its allocation"));
    }

    let end = offset.checked_add(len as u64);
    if end.map_or(true, |end| end > real_size) {
        debug!(
            "non-resident read {:#x}+{:#x} past stream of {:#x}",
            offset, len, real_size
        );
        return Err(NtfsError::corrupted("read past the end of a non-resident attribute"));
    }

    if offset / cluster_size < starting_vcn {
        return Err(NtfsError::corrupted("read starts before the fragment that maps it"));
    }

    let compressed = header.is_compressed() && header.type_code == ATTR_TYPE_DATA && !bootstrap;
    if compressed && compression_unit != COMPRESSION_UNIT_SHIFT {
        return Err(NtfsError::corrupted(format!(
            "compression unit of 2^{} clusters is invalid",
            compression_unit
        )));
    }
    if header.is_encrypted() && header.type_code == ATTR_TYPE_DATA {
        return Err(NtfsError::Unsupported("encrypted streams".to_string()));
    }

    Ok(StreamPlan {
        runs: record[runs_start..runs_end].to_vec(),
        starting_vcn,
        attr_type: header.type_code,
        initialized_size: initialized_size.min(real_size),
        compressed,
    })
}

fn execute(
    volume: &Volume,
    plan: &StreamPlan,
    mut runlist: RunList<'_>,
    dest: &mut [u8],
    offset: u64,
) -> Result<(), NtfsError> {
    // bytes past the initialized size read as zero
    let valid = plan.initialized_size.saturating_sub(offset).min(dest.len() as u64) as usize;
    let (head, tail) = dest.split_at_mut(valid);
    tail.fill(0);
    if head.is_empty() {
        return Ok(());
    }

    trace!(
        "reading {:#x} bytes at {:#x} of attribute {:#x}{}",
        head.len(),
        offset,
        plan.attr_type,
        if plan.compressed { " (compressed)" } else { "" }
    );
    if plan.compressed {
        compression::read_compressed(volume, &mut runlist, head, offset)
    } else {
        read_clusters(volume, &mut runlist, head, offset)
    }
}

/// Copy clusters through the run list, one device read per cluster
/// touched. Sparse clusters are zero-filled without I/O.
pub fn read_clusters(volume: &Volume, runlist: &mut RunList<'_>, dest: &mut [u8], offset: u64) -> Result<(), NtfsError> {
    let cluster_size = volume.geometry().cluster_size_u64();
    let mut done = 0usize;
    while done < dest.len() {
        let pos = offset + done as u64;
        let vcn = pos / cluster_size;
        let within = pos % cluster_size;
        let count = ((cluster_size - within) as usize).min(dest.len() - done);
        let chunk = &mut dest[done..done + count];

        match runlist.lcn(vcn)? {
            None => chunk.fill(0),
            Some(lcn) => {
                let disk_offset = lcn
                    .checked_mul(cluster_size)
                    .and_then(|o| o.checked_add(within))
                    .ok_or_else(|| NtfsError::corrupted("cluster number overflows the volume"))?;
                volume.disk_read(disk_offset, chunk)?;
            }
        }
        done += count;
    }
    Ok(())
}
