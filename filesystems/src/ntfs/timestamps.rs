// NTFS timestamp handling
// Converts 100ns-since-1601 FILETIME values into calendar times

use crate::ntfs::bytes::{ensure_slice, read_u16, read_u32, read_u64, read_u8};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use openntfs_core::NtfsError;

/// Seconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_DIFF: i64 = 11_644_473_600;

/// FILETIME is in 100-nanosecond intervals
const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

pub const EFI_TIME_SIZE: usize = 16;

/// Converts a FILETIME into a UTC calendar time. `None` when chrono cannot
/// represent it.
pub fn filetime_to_datetime(filetime: u64) -> Option<NaiveDateTime> {
    let seconds = (filetime / FILETIME_TICKS_PER_SECOND) as i64 - WINDOWS_EPOCH_DIFF;
    let nanos = ((filetime % FILETIME_TICKS_PER_SECOND) * 100) as u32;
    DateTime::<Utc>::from_timestamp(seconds, nanos).map(|t| t.naive_utc())
}

/// Converts a UTC calendar time back to a FILETIME, saturating at the
/// 1601 epoch.
pub fn datetime_to_filetime(time: NaiveDateTime) -> u64 {
    let utc = time.and_utc();
    let seconds = utc.timestamp() + WINDOWS_EPOCH_DIFF;
    if seconds < 0 {
        return 0;
    }
    seconds as u64 * FILETIME_TICKS_PER_SECOND + (utc.timestamp_subsec_nanos() / 100) as u64
}

/// Broken-down time in the firmware `EFI_TIME` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EfiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
}

impl EfiTime {
    pub fn from_filetime(filetime: u64) -> Self {
        match filetime_to_datetime(filetime) {
            Some(t) => Self {
                year: t.year().clamp(0, u16::MAX as i32) as u16,
                month: t.month() as u8,
                day: t.day() as u8,
                hour: t.hour() as u8,
                minute: t.minute() as u8,
                second: t.second() as u8,
                nanosecond: t.nanosecond(),
            },
            None => Self::default(),
        }
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_nano_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
            self.nanosecond,
        )
    }

    /// 16 bytes: year, month, day, hour, minute, second, pad, nanosecond,
    /// time zone (unspecified), daylight, pad.
    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.year.to_le_bytes());
        out[2] = self.month;
        out[3] = self.day;
        out[4] = self.hour;
        out[5] = self.minute;
        out[6] = self.second;
        out[7] = 0;
        out[8..12].copy_from_slice(&self.nanosecond.to_le_bytes());
        out[12..14].copy_from_slice(&0x07FFu16.to_le_bytes());
        out[14] = 0;
        out[15] = 0;
    }

    pub fn decode(data: &[u8], offset: usize) -> Result<Self, NtfsError> {
        ensure_slice(data, offset, EFI_TIME_SIZE)?;
        Ok(Self {
            year: read_u16(data, offset)?,
            month: read_u8(data, offset + 2)?,
            day: read_u8(data, offset + 3)?,
            hour: read_u8(data, offset + 4)?,
            minute: read_u8(data, offset + 5)?,
            second: read_u8(data, offset + 6)?,
            nanosecond: read_u32(data, offset + 8)?,
        })
    }
}

/// The four times of a `$STANDARD_INFORMATION` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimestamps {
    pub creation_time: u64,
    pub modification_time: u64,
    pub mft_modification_time: u64,
    pub access_time: u64,
}

impl NtfsTimestamps {
    pub fn parse(value: &[u8]) -> Result<Self, NtfsError> {
        Ok(Self {
            creation_time: read_u64(value, 0x00)?,
            modification_time: read_u64(value, 0x08)?,
            mft_modification_time: read_u64(value, 0x10)?,
            access_time: read_u64(value, 0x18)?,
        })
    }
}
