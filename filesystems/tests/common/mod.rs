// Synthetic NTFS images for the integration tests
// Lays out a boot sector, an $MFT of fixed-up FILE records, index roots,
// INDX records and file data inside a MemoryDevice

#![allow(dead_code)]

use openntfs_core::{BlockDevice, DeviceGeometry, MemoryDevice, NtfsError};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SECTOR: usize = 512;
pub const CLUSTER: usize = 4096;
pub const RECORD: usize = 1024;
pub const INDX: usize = 4096;

pub const MFT_LCN: u64 = 4;
pub const MFT_RECORDS: u64 = 96;
const MFT_CLUSTERS: u64 = MFT_RECORDS * RECORD as u64 / CLUSTER as u64;

pub const VOLUME_RECORD: u64 = 3;
pub const ROOT_RECORD: u64 = 5;
const FIRST_USER_RECORD: u64 = 16;

/// 2021-06-01 12:00:00 UTC as a FILETIME.
pub const TIME: u64 = 132_670_224_000_000_000;

pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_VOLUME_NAME: u32 = 0x60;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_INDEX_ROOT: u32 = 0x90;
pub const ATTR_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_BITMAP: u32 = 0xB0;
pub const ATTR_REPARSE_POINT: u32 = 0xC0;

pub const FLAG_COMPRESSED: u16 = 0x0001;
pub const FLAG_ENCRYPTED: u16 = 0x4000;
pub const FLAG_SPARSE: u16 = 0x8000;

pub const RECORD_IN_USE: u16 = 0x0001;
pub const RECORD_DIRECTORY: u16 = 0x0002;

pub const NS_POSIX: u8 = 0;
pub const NS_WIN32: u8 = 1;
pub const NS_DOS: u8 = 2;

const FILE_ATTR_ARCHIVE: u32 = 0x0020;
const FILE_ATTR_REPARSE: u32 = 0x0400;
const FILE_ATTR_ENCRYPTED: u32 = 0x4000;
const FILE_ATTR_DIRECTORY: u32 = 0x1000_0000;

const SYMLINK_TAG: u32 = 0xA000_000C;

/// Bytes of index entries kept in `$INDEX_ROOT` before spilling to INDX.
const ROOT_ENTRY_BUDGET: usize = 480;

pub fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// File reference with sequence number 1 in the top 16 bits.
fn file_ref(record: u64) -> u64 {
    record | (1u64 << 48)
}

/// Deterministic pseudo-random bytes.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// Stamp the update sequence over every sector end of `buf`.
pub fn protect(buf: &mut [u8], usa_offset: usize, usn: u16) {
    put_u16(buf, usa_offset, usn);
    for i in 0..buf.len() / SECTOR {
        let end = (i + 1) * SECTOR - 2;
        let saved = [buf[end], buf[end + 1]];
        buf[usa_offset + 2 + 2 * i..usa_offset + 4 + 2 * i].copy_from_slice(&saved);
        put_u16(buf, end, usn);
    }
}

// ---- run lists ----

#[derive(Debug, Clone, Copy)]
pub enum Run {
    Data { lcn: u64, count: u64 },
    Sparse(u64),
}

fn unsigned_field(v: u64) -> Vec<u8> {
    let mut bytes = v.to_le_bytes().to_vec();
    while bytes.len() > 1 && bytes[bytes.len() - 1] == 0 {
        bytes.pop();
    }
    bytes
}

fn signed_field(v: i64) -> Vec<u8> {
    let mut bytes = v.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let top = bytes[bytes.len() - 1];
        let next_sign = bytes[bytes.len() - 2] & 0x80;
        if (top == 0 && next_sign == 0) || (top == 0xFF && next_sign != 0) {
            bytes.pop();
        } else {
            break;
        }
    }
    bytes
}

pub fn encode_runs(runs: &[Run]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous = 0i64;
    for run in runs {
        match *run {
            Run::Data { lcn, count } => {
                let length = unsigned_field(count);
                let delta = signed_field(lcn as i64 - previous);
                previous = lcn as i64;
                out.push(((delta.len() as u8) << 4) | length.len() as u8);
                out.extend(length);
                out.extend(delta);
            }
            Run::Sparse(count) => {
                let length = unsigned_field(count);
                out.push(length.len() as u8);
                out.extend(length);
            }
        }
    }
    out.push(0);
    out
}

// ---- attributes ----

pub fn resident_attr(type_code: u32, name: &str, id: u16, value: &[u8]) -> Vec<u8> {
    let name = utf16le(name);
    let value_offset = align8(0x18 + name.len());
    let length = align8(value_offset + value.len());
    let mut a = vec![0u8; length];
    put_u32(&mut a, 0x00, type_code);
    put_u32(&mut a, 0x04, length as u32);
    a[0x09] = (name.len() / 2) as u8;
    put_u16(&mut a, 0x0A, 0x18);
    put_u16(&mut a, 0x0E, id);
    put_u32(&mut a, 0x10, value.len() as u32);
    put_u16(&mut a, 0x14, value_offset as u16);
    a[0x18..0x18 + name.len()].copy_from_slice(&name);
    a[value_offset..value_offset + value.len()].copy_from_slice(value);
    a
}

#[derive(Debug, Clone)]
pub struct NonResident {
    pub type_code: u32,
    pub name: String,
    pub id: u16,
    pub flags: u16,
    pub compression_unit: u16,
    pub starting_vcn: u64,
    pub last_vcn: u64,
    pub runs: Vec<Run>,
    pub allocated_size: u64,
    pub real_size: u64,
    pub initialized_size: u64,
}

impl NonResident {
    /// A single-fragment stream of `real_size` bytes over `runs`.
    pub fn new(type_code: u32, runs: Vec<Run>, real_size: u64) -> Self {
        let clusters: u64 = runs
            .iter()
            .map(|r| match r {
                Run::Data { count, .. } | Run::Sparse(count) => *count,
            })
            .sum();
        Self {
            type_code,
            name: String::new(),
            id: 0,
            flags: 0,
            compression_unit: 0,
            starting_vcn: 0,
            last_vcn: clusters.saturating_sub(1),
            runs,
            allocated_size: clusters * CLUSTER as u64,
            real_size,
            initialized_size: real_size,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let name = utf16le(&self.name);
        let runs = encode_runs(&self.runs);
        let runs_offset = align8(0x40 + name.len());
        let length = align8(runs_offset + runs.len());
        let mut a = vec![0u8; length];
        put_u32(&mut a, 0x00, self.type_code);
        put_u32(&mut a, 0x04, length as u32);
        a[0x08] = 1;
        a[0x09] = (name.len() / 2) as u8;
        put_u16(&mut a, 0x0A, 0x40);
        put_u16(&mut a, 0x0C, self.flags);
        put_u16(&mut a, 0x0E, self.id);
        put_u64(&mut a, 0x10, self.starting_vcn);
        put_u64(&mut a, 0x18, self.last_vcn);
        put_u16(&mut a, 0x20, runs_offset as u16);
        put_u16(&mut a, 0x22, self.compression_unit);
        put_u64(&mut a, 0x28, self.allocated_size);
        put_u64(&mut a, 0x30, self.real_size);
        put_u64(&mut a, 0x38, self.initialized_size);
        a[0x40..0x40 + name.len()].copy_from_slice(&name);
        a[runs_offset..runs_offset + runs.len()].copy_from_slice(&runs);
        a
    }
}

pub fn standard_information(time: u64) -> Vec<u8> {
    let mut v = vec![0u8; 0x48];
    for i in 0..4 {
        put_u64(&mut v, i * 8, time);
    }
    put_u32(&mut v, 0x20, FILE_ATTR_ARCHIVE);
    resident_attr(ATTR_STANDARD_INFORMATION, "", 0, &v)
}

/// One `$ATTRIBUTE_LIST` record.
pub fn attr_list_record(type_code: u32, starting_vcn: u64, record: u64, id: u16) -> Vec<u8> {
    let mut r = vec![0u8; 0x20];
    put_u32(&mut r, 0x00, type_code);
    put_u16(&mut r, 0x04, 0x20);
    r[0x07] = 0x1A;
    put_u64(&mut r, 0x08, starting_vcn);
    put_u64(&mut r, 0x10, file_ref(record));
    put_u16(&mut r, 0x18, id);
    r
}

/// A protected FILE record holding `attrs` in order.
pub fn file_record(flags: u16, base: u64, attrs: &[Vec<u8>]) -> Vec<u8> {
    let mut r = vec![0u8; RECORD];
    r[0..4].copy_from_slice(b"FILE");
    put_u16(&mut r, 0x04, 0x30);
    put_u16(&mut r, 0x06, (RECORD / SECTOR + 1) as u16);
    put_u16(&mut r, 0x10, 1);
    put_u16(&mut r, 0x12, 1);
    put_u16(&mut r, 0x14, 0x38);
    put_u16(&mut r, 0x16, flags);
    put_u32(&mut r, 0x1C, RECORD as u32);
    if base != 0 {
        put_u64(&mut r, 0x20, file_ref(base));
    }

    let mut pos = 0x38;
    for attr in attrs {
        assert!(pos + attr.len() + 8 <= RECORD, "attributes overflow the FILE record");
        r[pos..pos + attr.len()].copy_from_slice(attr);
        pos += attr.len();
    }
    put_u32(&mut r, pos, 0xFFFF_FFFF);
    pos += 8;
    put_u32(&mut r, 0x18, pos as u32);

    protect(&mut r, 0x30, 1);
    r
}

// ---- directory indexes ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Dir,
    Link,
    Encrypted,
}

/// A directory entry as the builder writes it.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub record: u64,
    pub kind: Kind,
    pub namespace: u8,
    pub size: u64,
}

impl Entry {
    pub fn file(name: &str, record: u64, size: u64) -> Self {
        Self { name: name.to_string(), record, kind: Kind::File, namespace: NS_WIN32, size }
    }

    pub fn dir(name: &str, record: u64) -> Self {
        Self { name: name.to_string(), record, kind: Kind::Dir, namespace: NS_WIN32, size: 0 }
    }

    pub fn link(name: &str, record: u64) -> Self {
        Self { name: name.to_string(), record, kind: Kind::Link, namespace: NS_WIN32, size: 0 }
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_namespace(mut self, namespace: u8) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn file_name_value(&self, parent: u64) -> Vec<u8> {
        let name = utf16le(&self.name);
        let mut v = vec![0u8; 0x42 + name.len()];
        put_u64(&mut v, 0x00, file_ref(parent));
        for at in [0x08, 0x10, 0x18, 0x20] {
            put_u64(&mut v, at, TIME);
        }
        put_u64(&mut v, 0x28, self.size.div_ceil(CLUSTER as u64) * CLUSTER as u64);
        put_u64(&mut v, 0x30, self.size);
        let flags = match self.kind {
            Kind::File => FILE_ATTR_ARCHIVE,
            Kind::Dir => FILE_ATTR_DIRECTORY,
            Kind::Link => FILE_ATTR_REPARSE,
            Kind::Encrypted => FILE_ATTR_ARCHIVE | FILE_ATTR_ENCRYPTED,
        };
        put_u32(&mut v, 0x38, flags);
        v[0x40] = (name.len() / 2) as u8;
        v[0x41] = self.namespace;
        v[0x42..].copy_from_slice(&name);
        v
    }

    pub fn encode(&self, parent: u64) -> Vec<u8> {
        let key = self.file_name_value(parent);
        let length = align8(0x10 + key.len());
        let mut e = vec![0u8; length];
        put_u64(&mut e, 0x00, file_ref(self.record));
        put_u16(&mut e, 0x08, length as u16);
        put_u16(&mut e, 0x0A, key.len() as u16);
        e[0x10..0x10 + key.len()].copy_from_slice(&key);
        e
    }
}

pub fn last_entry() -> Vec<u8> {
    let mut e = vec![0u8; 0x10];
    put_u16(&mut e, 0x08, 0x10);
    put_u16(&mut e, 0x0C, 0x0002);
    e
}

pub fn index_root_value(entries: &[u8], large: bool) -> Vec<u8> {
    let mut v = vec![0u8; 0x20];
    put_u32(&mut v, 0x00, ATTR_FILE_NAME);
    put_u32(&mut v, 0x04, 1);
    put_u32(&mut v, 0x08, INDX as u32);
    v[0x0C] = 1;
    let total = (0x10 + entries.len() + 0x10) as u32;
    put_u32(&mut v, 0x10, 0x10);
    put_u32(&mut v, 0x14, total);
    put_u32(&mut v, 0x18, total);
    v[0x1C] = large as u8;
    v.extend_from_slice(entries);
    v.extend(last_entry());
    v
}

/// A protected INDX record at `vcn`.
pub fn indx_record(vcn: u64, entries: &[u8]) -> Vec<u8> {
    let mut r = vec![0u8; INDX];
    r[0..4].copy_from_slice(b"INDX");
    put_u16(&mut r, 0x04, 0x28);
    put_u16(&mut r, 0x06, (INDX / SECTOR + 1) as u16);
    put_u64(&mut r, 0x10, vcn);
    put_u32(&mut r, 0x18, 0x28);
    put_u32(&mut r, 0x1C, (0x28 + entries.len() + 0x10) as u32);
    put_u32(&mut r, 0x20, (INDX - 0x18) as u32);
    assert!(0x40 + entries.len() + 0x10 <= INDX, "entries overflow the INDX record");
    r[0x40..0x40 + entries.len()].copy_from_slice(entries);
    let last = last_entry();
    r[0x40 + entries.len()..0x50 + entries.len()].copy_from_slice(&last);
    protect(&mut r, 0x28, 1);
    r
}

/// How a directory's INDX records are spread over the volume.
#[derive(Debug, Clone, Default)]
pub struct DirLayout {
    /// Number of run-list elements the allocation is split into (at least 1).
    pub fragments: usize,
    /// An INDX slot left out of the bitmap and filled with garbage.
    pub unused_slot: Option<usize>,
}

// ---- LZNT1 ----

fn token_split(position: usize) -> (u32, usize) {
    let mut shift = 12;
    let mut max_length = 0xFFF;
    let mut i = position - 1;
    while i >= 0x10 {
        i >>= 1;
        shift -= 1;
        max_length >>= 1;
    }
    (shift, max_length + 3)
}

fn longest_match(data: &[u8], pos: usize) -> (usize, usize) {
    if pos == 0 {
        return (0, 0);
    }
    let (shift, max_length) = token_split(pos);
    let max_length = max_length.min(data.len() - pos).min(4095);
    let max_distance = pos.min(1usize << (16 - shift)).min(128);
    let mut best = (0, 0);
    for distance in 1..=max_distance {
        let mut length = 0;
        while length < max_length && data[pos + length] == data[pos + length - distance] {
            length += 1;
        }
        if length > best.1 {
            best = (distance, length);
        }
    }
    best
}

/// One compressed LZNT1 block (header included) for a 4 KiB chunk.
pub fn lznt1_compress_block(data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), 4096);
    let mut payload = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let tag_at = payload.len();
        payload.push(0u8);
        for bit in 0..8 {
            if pos >= data.len() {
                break;
            }
            let (distance, length) = longest_match(data, pos);
            if length >= 3 {
                let (shift, _) = token_split(pos);
                let token = (((distance - 1) << shift) | (length - 3)) as u16;
                payload.extend(token.to_le_bytes());
                payload[tag_at] |= 1 << bit;
                pos += length;
            } else {
                payload.push(data[pos]);
                pos += 1;
            }
        }
    }
    assert!(payload.len() <= 4096, "block does not compress");
    let mut block = (0xB000u16 | (payload.len() - 1) as u16).to_le_bytes().to_vec();
    block.extend(payload);
    block
}

/// A compressed block made of literals only; whatever `data` leaves of the
/// 4 KiB block decodes as zeros.
pub fn lznt1_literal_block(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    for group in data.chunks(8) {
        payload.push(0u8);
        payload.extend_from_slice(group);
    }
    assert!(payload.len() <= 4096, "too many literals for one block");
    let mut block = (0xB000u16 | (payload.len() - 1) as u16).to_le_bytes().to_vec();
    block.extend(payload);
    block
}

/// A block stored without compression.
pub fn lznt1_raw_block(data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), 4096);
    let mut block = 0x3FFFu16.to_le_bytes().to_vec();
    block.extend_from_slice(data);
    block
}

/// Data that compresses well: a short cycle.
pub fn compressible(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| b"NTFS compression test "[i % 22].wrapping_add(seed)).collect()
}

// ---- the image ----

pub struct ImageBuilder {
    image: Vec<u8>,
    next_lcn: u64,
    next_record: u64,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// An empty volume: `$MFT`, an unlabeled `$Volume` and an empty root.
    pub fn new() -> Self {
        let mut builder = Self {
            image: vec![0u8; (MFT_LCN + MFT_CLUSTERS) as usize * CLUSTER],
            next_lcn: MFT_LCN + MFT_CLUSTERS,
            next_record: FIRST_USER_RECORD,
        };

        let mft_data = NonResident::new(
            ATTR_DATA,
            vec![Run::Data { lcn: MFT_LCN, count: MFT_CLUSTERS }],
            MFT_RECORDS * RECORD as u64,
        );
        builder.put_record(0, file_record(RECORD_IN_USE, 0, &[standard_information(TIME), mft_data.encode()]));
        for number in [1, 2, 4, 6, 7, 8, 9, 10, 11] {
            builder.put_record(number, file_record(RECORD_IN_USE, 0, &[standard_information(TIME)]));
        }
        builder.set_label(None);
        builder.set_directory(ROOT_RECORD, ROOT_RECORD, &[]);
        builder
    }

    pub fn alloc(&mut self, clusters: u64) -> u64 {
        let lcn = self.next_lcn;
        self.next_lcn += clusters;
        let needed = self.next_lcn as usize * CLUSTER;
        if self.image.len() < needed {
            self.image.resize(needed, 0);
        }
        lcn
    }

    pub fn write_at(&mut self, offset: usize, data: &[u8]) {
        if self.image.len() < offset + data.len() {
            self.image.resize(offset + data.len(), 0);
        }
        self.image[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn write_clusters(&mut self, lcn: u64, data: &[u8]) {
        self.write_at(lcn as usize * CLUSTER, data);
    }

    /// Allocate `data.len()` rounded up to clusters and store `data` there.
    pub fn store(&mut self, data: &[u8]) -> u64 {
        let lcn = self.alloc(data.len().div_ceil(CLUSTER).max(1) as u64);
        self.write_clusters(lcn, data);
        lcn
    }

    pub fn new_record(&mut self) -> u64 {
        let number = self.next_record;
        assert!(number < MFT_RECORDS, "synthetic $MFT is full");
        self.next_record += 1;
        number
    }

    /// Offset of FILE record `number` in the image.
    pub fn record_offset(number: u64) -> usize {
        MFT_LCN as usize * CLUSTER + number as usize * RECORD
    }

    pub fn put_record(&mut self, number: u64, record: Vec<u8>) {
        self.write_at(Self::record_offset(number), &record);
    }

    pub fn set_label(&mut self, label: Option<&str>) {
        let mut attrs = vec![standard_information(TIME)];
        if let Some(label) = label {
            attrs.push(resident_attr(ATTR_VOLUME_NAME, "", 1, &utf16le(label)));
        }
        self.put_record(VOLUME_RECORD, file_record(RECORD_IN_USE, 0, &attrs));
    }

    /// A regular file: resident when small, one contiguous run otherwise.
    pub fn add_file(&mut self, contents: &[u8]) -> u64 {
        let data = if contents.len() <= 512 {
            resident_attr(ATTR_DATA, "", 1, contents)
        } else {
            let lcn = self.store(contents);
            let clusters = contents.len().div_ceil(CLUSTER) as u64;
            let mut attr = NonResident::new(ATTR_DATA, vec![Run::Data { lcn, count: clusters }], contents.len() as u64);
            attr.id = 1;
            attr.encode()
        };
        self.add_record(RECORD_IN_USE, &[standard_information(TIME), data])
    }

    /// A regular file with resident `$DATA`, whatever its size.
    pub fn add_resident_file(&mut self, contents: &[u8]) -> u64 {
        self.add_record(
            RECORD_IN_USE,
            &[standard_information(TIME), resident_attr(ATTR_DATA, "", 1, contents)],
        )
    }

    /// A regular file whose `$DATA` is `attr`.
    pub fn add_file_with(&mut self, attr: &NonResident) -> u64 {
        self.add_record(RECORD_IN_USE, &[standard_information(TIME), attr.encode()])
    }

    pub fn add_record(&mut self, flags: u16, attrs: &[Vec<u8>]) -> u64 {
        let number = self.new_record();
        self.put_record(number, file_record(flags, 0, attrs));
        number
    }

    /// A symbolic link to `target` (Windows spelling, e.g. `\??\C:\x`).
    pub fn add_symlink(&mut self, target: &str) -> u64 {
        let path = utf16le(target);
        let mut v = vec![0u8; 0x14];
        put_u32(&mut v, 0x00, SYMLINK_TAG);
        put_u16(&mut v, 0x04, (12 + 2 * path.len()) as u16);
        put_u16(&mut v, 0x08, 0);
        put_u16(&mut v, 0x0A, path.len() as u16);
        put_u16(&mut v, 0x0C, path.len() as u16);
        put_u16(&mut v, 0x0E, path.len() as u16);
        put_u32(&mut v, 0x10, if target.starts_with('\\') { 0 } else { 1 });
        v.extend_from_slice(&path);
        v.extend_from_slice(&path);
        self.add_record(
            RECORD_IN_USE,
            &[standard_information(TIME), resident_attr(ATTR_REPARSE_POINT, "", 1, &v)],
        )
    }

    pub fn add_directory(&mut self, parent: u64, entries: &[Entry]) -> u64 {
        let number = self.new_record();
        self.set_directory(number, parent, entries);
        number
    }

    pub fn set_directory(&mut self, number: u64, parent: u64, entries: &[Entry]) {
        let layout = DirLayout { fragments: 1, unused_slot: None };
        self.set_directory_with(number, parent, entries, &layout);
    }

    /// Write directory `number`: entries fill `$INDEX_ROOT` first, the rest
    /// go to INDX records in order.
    pub fn set_directory_with(&mut self, number: u64, parent: u64, entries: &[Entry], layout: &DirLayout) {
        let encoded: Vec<Vec<u8>> = entries.iter().map(|e| e.encode(number)).collect();

        let mut root = Vec::new();
        let mut rest = encoded.as_slice();
        while let Some((first, tail)) = rest.split_first() {
            if root.len() + first.len() > ROOT_ENTRY_BUDGET {
                break;
            }
            root.extend_from_slice(first);
            rest = tail;
        }

        let mut records: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::new();
        for entry in rest {
            if 0x40 + current.len() + entry.len() + 0x10 > INDX {
                records.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(entry);
        }
        if !current.is_empty() {
            records.push(current);
        }

        let mut attrs = vec![
            standard_information(TIME),
            resident_attr(ATTR_INDEX_ROOT, "$I30", 2, &index_root_value(&root, !records.is_empty())),
        ];

        if !records.is_empty() {
            // INDX images in VCN order, with the unused slot spliced in
            let mut images: Vec<Vec<u8>> = Vec::new();
            let mut bitmap = Vec::new();
            let mut in_use = records.into_iter();
            loop {
                let slot = images.len();
                if layout.unused_slot == Some(slot) {
                    images.push(pattern(INDX, slot as u32 + 7));
                    bitmap.push(false);
                    continue;
                }
                match in_use.next() {
                    Some(entries) => {
                        images.push(indx_record(slot as u64, &entries));
                        bitmap.push(true);
                    }
                    None => break,
                }
            }

            let fragments = layout.fragments.max(1).min(images.len());
            let per_fragment = images.len().div_ceil(fragments);
            let mut runs = Vec::new();
            for chunk in images.chunks(per_fragment) {
                let lcn = self.alloc(chunk.len() as u64);
                for (i, image) in chunk.iter().enumerate() {
                    self.write_clusters(lcn + i as u64, image);
                }
                runs.push(Run::Data { lcn, count: chunk.len() as u64 });
                // a hole between fragments
                self.alloc(1);
            }

            let mut bits = vec![0u8; align8(bitmap.len().div_ceil(8))];
            for (i, used) in bitmap.iter().enumerate() {
                if *used {
                    bits[i / 8] |= 1 << (i % 8);
                }
            }

            let mut allocation =
                NonResident::new(ATTR_INDEX_ALLOCATION, runs, (images.len() * INDX) as u64).named("$I30");
            allocation.id = 3;
            attrs.push(allocation.encode());
            attrs.push(resident_attr(ATTR_BITMAP, "$I30", 4, &bits));
        }

        self.put_record(number, file_record(RECORD_IN_USE | RECORD_DIRECTORY, 0, &attrs));
    }

    pub fn finish(self) -> MemoryDevice {
        let mut image = self.image;
        let total_sectors = (image.len() / SECTOR) as u64;

        let bs = &mut image[0..SECTOR];
        bs[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
        bs[3..11].copy_from_slice(b"NTFS    ");
        put_u16(bs, 0x0B, SECTOR as u16);
        bs[0x0D] = (CLUSTER / SECTOR) as u8;
        bs[0x15] = 0xF8;
        put_u64(bs, 0x28, total_sectors - 1);
        put_u64(bs, 0x30, MFT_LCN);
        put_u64(bs, 0x38, 2);
        bs[0x40] = (-10i8) as u8; // 1 KiB FILE records
        bs[0x44] = 1; // one cluster per INDX record
        put_u64(bs, 0x48, 0x0123_4567_89AB_CDEF);
        bs[510] = 0x55;
        bs[511] = 0xAA;

        MemoryDevice::new(image)
    }
}

// ---- the shared sample volume ----

/// Contents of [`sample_volume`], for comparing reads against.
pub struct Sample {
    pub hello: Vec<u8>,
    pub big: Vec<u8>,
    pub sparse: Vec<u8>,
    pub partial: Vec<u8>,
    pub compressed: Vec<u8>,
    pub listed: Vec<u8>,
    pub readme: Vec<u8>,
    pub root_names: Vec<&'static str>,
}

pub const LABEL: &str = "SYNTHETIC";

/// A labeled volume with one of everything the reader handles.
pub fn sample_volume() -> (MemoryDevice, Sample) {
    let mut b = ImageBuilder::new();
    b.set_label(Some(LABEL));

    let hello = b"Hello, NTFS!\n".to_vec();
    let hello_rec = b.add_file(&hello);

    // 64 KiB in two runs that are not adjacent on disk
    let big = pattern(16 * CLUSTER, 1);
    let first = b.store(&big[..8 * CLUSTER]);
    b.alloc(3);
    let second = b.store(&big[8 * CLUSTER..]);
    let mut big_attr = NonResident::new(
        ATTR_DATA,
        vec![Run::Data { lcn: first, count: 8 }, Run::Data { lcn: second, count: 8 }],
        big.len() as u64,
    );
    big_attr.id = 1;
    let big_rec = b.add_file_with(&big_attr);

    // data, 8 sparse clusters, data
    let mut sparse = pattern(16 * CLUSTER, 2);
    sparse[4 * CLUSTER..12 * CLUSTER].fill(0);
    let head = b.store(&sparse[..4 * CLUSTER]);
    let tail = b.store(&sparse[12 * CLUSTER..]);
    let mut sparse_attr = NonResident::new(
        ATTR_DATA,
        vec![
            Run::Data { lcn: head, count: 4 },
            Run::Sparse(8),
            Run::Data { lcn: tail, count: 4 },
        ],
        sparse.len() as u64,
    );
    sparse_attr.flags = FLAG_SPARSE;
    sparse_attr.id = 1;
    let sparse_rec = b.add_file_with(&sparse_attr);

    // only the first cluster is initialized; the second holds garbage
    let mut partial = pattern(2 * CLUSTER, 3);
    let partial_lcn = b.store(&partial);
    partial[CLUSTER..].fill(0);
    let mut partial_attr = NonResident::new(
        ATTR_DATA,
        vec![Run::Data { lcn: partial_lcn, count: 2 }],
        partial.len() as u64,
    );
    partial_attr.initialized_size = CLUSTER as u64;
    partial_attr.id = 1;
    let partial_rec = b.add_file_with(&partial_attr);

    let (compressed, compressed_attr) = build_compressed(&mut b);
    let compressed_rec = b.add_file_with(&compressed_attr);

    let (listed, listed_rec) = build_listed(&mut b);

    let mut secret_attr = NonResident::new(ATTR_DATA, vec![Run::Data { lcn: head, count: 1 }], 1234);
    secret_attr.flags = FLAG_ENCRYPTED;
    let secret_rec = b.add_file_with(&secret_attr);

    let foo_rec = b.add_file(b"foo");
    let posix_rec = b.add_file(b"posix");

    let readme = b"docs readme\n".to_vec();
    let readme_rec = b.add_file(&readme);
    let notes_rec = b.add_file(b"notes");
    let up_link = b.add_symlink(r"..\hello.txt");
    let docs_rec = b.new_record();
    b.set_directory(
        docs_rec,
        ROOT_RECORD,
        &[
            Entry::file("readme.md", readme_rec, readme.len() as u64),
            Entry::file("notes.txt", notes_rec, 5),
            Entry::link("up.txt", up_link),
        ],
    );

    let abs_link = b.add_symlink(r"\??\C:\hello.txt");
    let dir_link = b.add_symlink("docs");

    let root_entries = vec![
        Entry::file("hello.txt", hello_rec, hello.len() as u64),
        Entry::file("big.bin", big_rec, big.len() as u64),
        Entry::file("sparse.bin", sparse_rec, sparse.len() as u64),
        Entry::file("partial.bin", partial_rec, partial.len() as u64),
        Entry::file("compressed.bin", compressed_rec, compressed.len() as u64),
        Entry::file("listed.bin", listed_rec, listed.len() as u64),
        Entry::file("secret.bin", secret_rec, 1234).with_kind(Kind::Encrypted),
        Entry::file("foo.txt", foo_rec, 3),
        Entry::file("FOO~1.TXT", foo_rec, 3).in_namespace(NS_DOS),
        Entry::file("Posix.txt", posix_rec, 5).in_namespace(NS_POSIX),
        Entry::dir("docs", docs_rec),
        Entry::link("link.txt", abs_link),
        Entry::link("docs_link", dir_link),
    ];
    let root_names = vec![
        "hello.txt",
        "big.bin",
        "sparse.bin",
        "partial.bin",
        "compressed.bin",
        "listed.bin",
        "secret.bin",
        "foo.txt",
        "Posix.txt",
        "docs",
        "link.txt",
        "docs_link",
    ];
    b.set_directory(ROOT_RECORD, ROOT_RECORD, &root_entries);

    (
        b.finish(),
        Sample {
            hello,
            big,
            sparse,
            partial,
            compressed,
            listed,
            readme,
            root_names,
        },
    )
}

/// Three compression units: LZNT1 in 10 of 16 clusters, all sparse, and
/// stored plain.
pub fn build_compressed(b: &mut ImageBuilder) -> (Vec<u8>, NonResident) {
    let unit = 16 * CLUSTER;
    let mut expected = Vec::with_capacity(3 * unit);

    let mut stream = Vec::new();
    for block in 0..16u32 {
        let data = if block < 9 {
            pattern(4096, 100 + block)
        } else {
            compressible(4096, block as u8)
        };
        stream.extend(if block < 9 {
            lznt1_raw_block(&data)
        } else {
            lznt1_compress_block(&data)
        });
        expected.extend(data);
    }
    let physical = stream.len().div_ceil(CLUSTER) as u64;
    assert_eq!(physical, 10, "first unit should occupy 10 clusters");
    let compressed_lcn = b.store(&stream);

    expected.extend(vec![0u8; unit]);

    let plain = pattern(unit, 200);
    let plain_lcn = b.store(&plain);
    expected.extend(&plain);

    let mut attr = NonResident::new(
        ATTR_DATA,
        vec![
            Run::Data { lcn: compressed_lcn, count: physical },
            Run::Sparse(16 - physical + 16),
            Run::Data { lcn: plain_lcn, count: 16 },
        ],
        expected.len() as u64,
    );
    attr.flags = FLAG_COMPRESSED;
    attr.compression_unit = 4;
    attr.id = 1;
    (expected, attr)
}

/// A file whose `$DATA` is split across two extension records named by a
/// resident `$ATTRIBUTE_LIST`.
pub fn build_listed(b: &mut ImageBuilder) -> (Vec<u8>, u64) {
    let size = 16 * CLUSTER - 100;
    let mut data = pattern(16 * CLUSTER, 9);
    let first = b.store(&data[..8 * CLUSTER]);
    b.alloc(1);
    let second = b.store(&data[8 * CLUSTER..]);
    data.truncate(size);

    let base = b.new_record();
    let ext1 = b.new_record();
    let ext2 = b.new_record();

    let mut head = NonResident::new(ATTR_DATA, vec![Run::Data { lcn: first, count: 8 }], size as u64);
    head.last_vcn = 7;
    head.allocated_size = 16 * CLUSTER as u64;
    let mut tail = NonResident::new(ATTR_DATA, vec![Run::Data { lcn: second, count: 8 }], 0);
    tail.starting_vcn = 8;
    tail.last_vcn = 15;
    tail.allocated_size = 0;
    tail.initialized_size = 0;

    b.put_record(ext1, file_record(RECORD_IN_USE, base, &[head.encode()]));
    b.put_record(ext2, file_record(RECORD_IN_USE, base, &[tail.encode()]));

    let mut list = Vec::new();
    list.extend(attr_list_record(ATTR_STANDARD_INFORMATION, 0, base, 0));
    list.extend(attr_list_record(ATTR_DATA, 0, ext1, 0));
    list.extend(attr_list_record(ATTR_DATA, 8, ext2, 0));
    b.put_record(
        base,
        file_record(
            RECORD_IN_USE,
            0,
            &[standard_information(TIME), resident_attr(ATTR_ATTRIBUTE_LIST, "", 1, &list)],
        ),
    );
    (data, base)
}

// ---- devices ----

/// Counts device reads so tests can assert that none happened.
pub struct CountingDevice {
    inner: MemoryDevice,
    reads: AtomicUsize,
}

impl CountingDevice {
    pub fn new(inner: MemoryDevice) -> Self {
        Self { inner, reads: AtomicUsize::new(0) }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }
}

impl BlockDevice for CountingDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), NtfsError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, buf)
    }

    fn geometry(&self) -> DeviceGeometry {
        self.inner.geometry()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
