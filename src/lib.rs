//! # bytes-map
//!
//! A hash map from byte strings to byte strings whose data lives in large
//! allocator-provided pages instead of per-entry objects.
//!
//! ## Features
//!
//! - **Two memory backings**: heap-owned `u64` arrays ([`HeapAllocator`]) or
//!   raw malloc'd memory ([`RawAllocator`]), chosen by the allocator.
//! - **Compact index**: two 64-bit words and one bit per slot, no per-entry
//!   allocation.
//! - **Write-once keys**: lookup returns a [`Location`] that either exposes the
//!   stored record or can store it exactly once.
//!
//! ## Architecture
//!
//! 1. **Data pages** ([`arena`]): keys and values are appended as
//!    length-prefixed, 8-byte aligned records into pages of a fixed size.
//!
//! 2. **Hash index** ([`index`]): an open-addressing table with triangular
//!    probing. Each slot holds the encoded key address ([`address`]) and the
//!    value offset packed with the key's MurmurHash3 code ([`murmur3`]).
//!
//! ## Example
//!
//! ```rust
//! use bytes_map::{BytesToBytesMap, HeapAllocator};
//!
//! let allocator = HeapAllocator::new();
//! let mut map = BytesToBytesMap::new(&allocator, 64).unwrap();
//!
//! let mut loc = map.lookup(b"user:1001");
//! assert!(!loc.is_defined());
//! loc.store_key_and_value(b"user:1001", b"alice").unwrap();
//!
//! let loc = map.lookup(b"user:1001");
//! assert_eq!(loc.value(), Some(&b"alice"[..]));
//! assert_eq!(map.len(), 1);
//!
//! map.free();
//! assert_eq!(allocator.stats().outstanding_blocks, 0);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod address;
pub mod arena;
pub mod bitset;
pub mod error;
pub mod index;
pub mod long_array;
pub mod memory;
pub mod murmur3;

mod map;

pub use address::PageAddress;
pub use bitset::BitSet;
pub use error::{Error, Result};
pub use index::{Doubling, GrowthStrategy};
pub use long_array::LongArray;
pub use map::{BytesToBytesMap, Iter, Location, DEFAULT_LOAD_FACTOR};
pub use memory::{
    AddressingMode, AllocatorStats, HeapAllocator, MemoryAllocator, MemoryBlock, RawAllocator,
};
pub use murmur3::Murmur3x86_32;

/// Memory usage statistics for a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    /// Bytes held by the hash index (entry words plus occupancy bits)
    pub index_bytes: usize,
    /// Bytes held in data pages
    pub page_bytes: usize,
    /// Bytes of data pages taken by records
    pub used_page_bytes: usize,
    /// Number of data pages
    pub num_pages: usize,
    /// Number of keys stored
    pub num_keys: usize,
    /// Bytes per key (calculated)
    pub bytes_per_key: f64,
}

/// Configuration for a [`BytesToBytesMap`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial number of index slots; rounded up to a power of two, at least 64
    pub initial_capacity: usize,
    /// Fraction of slots that may be filled before the index grows, in (0, 1)
    pub load_factor: f64,
    /// Size of each data page in bytes; a record must fit in one page
    pub page_size: usize,
    /// Most data pages the map may allocate
    pub max_pages: usize,
    /// How the index capacity grows
    pub growth_strategy: &'static dyn GrowthStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: index::MIN_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            page_size: arena::DEFAULT_PAGE_SIZE,
            max_pages: address::MAX_PAGES,
            growth_strategy: &Doubling,
        }
    }
}

impl Config {
    /// Check every field, returning [`Error::InvalidConfig`] for the first bad one.
    pub fn validate(&self) -> Result<()> {
        if !(self.load_factor > 0.0 && self.load_factor < 1.0) {
            return Err(Error::InvalidConfig("load factor must be in (0, 1)"));
        }
        if self.page_size == 0 || self.page_size % memory::WORD_SIZE != 0 {
            return Err(Error::InvalidConfig("page size must be a positive multiple of 8"));
        }
        if self.page_size as u64 > address::MAX_PAGE_SIZE {
            return Err(Error::InvalidConfig("page size exceeds the addressable page offset"));
        }
        if self.max_pages == 0 || self.max_pages > address::MAX_PAGES {
            return Err(Error::InvalidConfig("max pages must be in 1..=8192"));
        }
        let Some(capacity) = index::normalize_capacity(self.initial_capacity) else {
            return Err(Error::InvalidConfig("initial capacity too large"));
        };
        if map::growth_threshold(capacity, self.load_factor) == 0 {
            return Err(Error::InvalidConfig("load factor leaves no usable slot"));
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests;
