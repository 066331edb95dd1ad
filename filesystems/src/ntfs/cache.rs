// Directory lookup cache
// Holds the most recent encoded directory record for one key

use log::trace;

/// FNV-1a over `data`.
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &b| (hash ^ b as u64).wrapping_mul(FNV_PRIME))
}

/// Identity of one directory read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub path_hash: u64,
    pub buffer_size: usize,
    pub dir_index: u64,
}

impl LookupKey {
    pub fn new(path: &str, buffer_size: usize, dir_index: u64) -> Self {
        Self {
            path_hash: fnv1a_hash(path.as_bytes()),
            buffer_size,
            dir_index,
        }
    }
}

/// Single-slot cache. Presenting any other key drops the slot.
#[derive(Debug, Default)]
pub struct LookupCache {
    slot: Option<(LookupKey, Vec<u8>)>,
    hits: u64,
    misses: u64,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, key: &LookupKey) -> Option<&[u8]> {
        let hit = matches!(&self.slot, Some((cached, _)) if cached == key);
        if hit {
            self.hits += 1;
            trace!("lookup cache hit for index {}", key.dir_index);
            self.slot.as_ref().map(|(_, payload)| payload.as_slice())
        } else {
            self.misses += 1;
            self.slot = None;
            None
        }
    }

    pub fn insert(&mut self, key: LookupKey, payload: Vec<u8>) {
        self.slot = Some((key, payload));
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
