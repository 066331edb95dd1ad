// NTFS run list decoder
// Walks the packed (length, delta-LCN) elements of a non-resident attribute

use crate::ntfs::attributes::AttrForm;
use crate::ntfs::resolver::AttrCursor;
use crate::ntfs::volume::Volume;
use log::{debug, trace};
use openntfs_core::NtfsError;

/// Where a run list goes when its bytes end but the attribute continues
/// in another FILE record through `$ATTRIBUTE_LIST`.
pub struct Continuation<'a> {
    pub volume: &'a Volume,
    pub cursor: &'a mut AttrCursor,
}

/// Cursor over one attribute's run list.
///
/// `[current_vcn, next_vcn)` is the window of the element read last.
pub struct RunList<'a> {
    runs: Vec<u8>,
    pos: usize,
    pub current_vcn: u64,
    pub next_vcn: u64,
    pub current_lcn: u64,
    pub is_sparse: bool,
    attr_type: u32,
    continuation: Option<Continuation<'a>>,
}

impl<'a> RunList<'a> {
    /// `runs` holds the bytes from the attribute's data-run offset to the
    /// end of the attribute.
    pub fn new(runs: Vec<u8>, starting_vcn: u64, attr_type: u32) -> Self {
        Self {
            runs,
            pos: 0,
            current_vcn: starting_vcn,
            next_vcn: starting_vcn,
            current_lcn: 0,
            is_sparse: false,
            attr_type,
            continuation: None,
        }
    }

    pub fn with_continuation(mut self, continuation: Continuation<'a>) -> Self {
        self.continuation = Some(continuation);
        self
    }

    /// Decode the next element, following `$ATTRIBUTE_LIST` into the next
    /// extension record when this record's runs are exhausted.
    pub fn read_element(&mut self) -> Result<(), NtfsError> {
        loop {
            let header = *self.runs.get(self.pos).ok_or_else(|| {
                debug!("Run list for type {:#x} ends without terminator", self.attr_type);
                NtfsError::corrupted("run list runs past its attribute")
            })?;
            let length_size = (header & 0x0F) as usize;
            let offset_size = (header >> 4) as usize;

            if length_size > 8 || offset_size > 8 || (length_size == 0 && offset_size != 0) {
                debug!("Bad run list header byte {:#04x}", header);
                return Err(NtfsError::corrupted("run list element header is invalid"));
            }

            if length_size == 0 {
                self.continue_in_next_record()?;
                continue;
            }

            let mut pos = self.pos + 1;
            let length = read_field(&self.runs, pos, length_size, false)?;
            pos += length_size;
            let delta = read_field(&self.runs, pos, offset_size, true)?;
            pos += offset_size;

            self.current_vcn = self.next_vcn;
            self.next_vcn = self.next_vcn.wrapping_add(length);
            if self.next_vcn <= self.current_vcn {
                debug!(
                    "Run list VCN does not advance: {:#x} -> {:#x}",
                    self.current_vcn, self.next_vcn
                );
                return Err(NtfsError::corrupted("run list VCNs are not increasing"));
            }

            self.current_lcn = self.current_lcn.wrapping_add(delta);
            self.is_sparse = delta == 0;
            self.pos = pos;

            trace!(
                "run [{:#x}, {:#x}) -> {}",
                self.current_vcn,
                self.next_vcn,
                if self.is_sparse { "sparse".to_string() } else { format!("{:#x}", self.current_lcn) }
            );
            return Ok(());
        }
    }

    fn continue_in_next_record(&mut self) -> Result<(), NtfsError> {
        let Some(continuation) = self.continuation.as_mut() else {
            return Err(NtfsError::corrupted("run list overflown"));
        };
        if !continuation.cursor.in_attribute_list() {
            return Err(NtfsError::corrupted("run list overflown"));
        }

        let Some(location) = continuation.cursor.find_attr(continuation.volume, self.attr_type)? else {
            return Err(NtfsError::corrupted("run list overflown"));
        };

        let AttrForm::NonResident { data_runs_offset, .. } = location.header.form else {
            return Err(NtfsError::corrupted("continued attribute should be non-resident"));
        };

        let record = continuation.cursor.record_bytes(location.source);
        let start = location.header.offset + data_runs_offset as usize;
        let end = location.header.offset + location.header.length as usize;
        let runs = record.get(start..end.min(record.len())).ok_or_else(|| {
            NtfsError::corrupted("continued attribute's data runs lie outside its record")
        })?;

        trace!("run list continues in extension record at VCN {:#x}", self.next_vcn);
        self.runs = runs.to_vec();
        self.pos = 0;
        self.current_lcn = 0;
        Ok(())
    }

    /// Physical cluster backing `vcn`, or `None` inside a sparse run.
    pub fn lcn(&mut self, vcn: u64) -> Result<Option<u64>, NtfsError> {
        if vcn < self.current_vcn {
            return Err(NtfsError::corrupted(format!(
                "VCN {:#x} precedes the run list window at {:#x}",
                vcn, self.current_vcn
            )));
        }
        while vcn >= self.next_vcn {
            self.read_element()?;
        }
        if self.is_sparse {
            Ok(None)
        } else {
            Ok(Some(self.current_lcn.wrapping_add(vcn - self.current_vcn)))
        }
    }
}

/// Little-endian field of `size` bytes; signed fields sign-extend from the
/// top bit of their last byte.
fn read_field(runs: &[u8], pos: usize, size: usize, signed: bool) -> Result<u64, NtfsError> {
    let bytes = runs
        .get(pos..pos + size)
        .ok_or_else(|| NtfsError::corrupted("run list element is truncated"))?;
    let mut value: u64 = if signed && size != 0 && bytes[size - 1] & 0x80 != 0 {
        u64::MAX
    } else {
        0
    };
    for (i, &b) in bytes.iter().enumerate() {
        value &= !(0xFFu64 << (i * 8));
        value |= (b as u64) << (i * 8);
    }
    Ok(value)
}
