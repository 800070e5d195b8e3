//! Open-addressing hash index.
//!
//! The index is a power-of-two sized pair of a [`LongArray`] and a [`BitSet`].
//! Slot `i` owns words `2 * i` (encoded key address) and `2 * i + 1` (offset to
//! the value in the upper 32 bits, key hash code in the lower 32 bits); bit `i`
//! says whether the slot is occupied.
//!
//! Collisions are resolved with quadratic probing over triangular numbers,
//! which visits every slot of a power-of-two table exactly once in the first
//! `capacity` steps.

use std::fmt;

use crate::address::unpack_value_word;
use crate::bitset::BitSet;
use crate::error::{Error, Result};
use crate::long_array::LongArray;
use crate::memory::{MemoryAllocator, WORD_SIZE};

/// Smallest index capacity.
pub const MIN_CAPACITY: usize = 64;

/// Largest index capacity: the entry words must stay addressable in bytes.
pub const MAX_CAPACITY: usize = 1 << (usize::BITS - 5);

/// Decides how large the index becomes when it grows.
pub trait GrowthStrategy: fmt::Debug {
    /// Capacity to grow to from `current`. The result is rounded up to a
    /// power of two; growth fails if that is not larger than `current`.
    fn next_capacity(&self, current: usize) -> usize;
}

/// Double the capacity on every growth.
#[derive(Clone, Copy, Debug, Default)]
pub struct Doubling;

impl GrowthStrategy for Doubling {
    fn next_capacity(&self, current: usize) -> usize {
        current.saturating_mul(2)
    }
}

/// Round a requested capacity up to a valid index capacity.
pub fn normalize_capacity(requested: usize) -> Option<usize> {
    requested
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .filter(|&c| c <= MAX_CAPACITY)
}

/// The slots visited when probing for a hash code: `h`, `h + 1`, `h + 3`,
/// `h + 6`, ... modulo the table size.
#[derive(Clone, Debug)]
pub struct ProbeSequence {
    pos: usize,
    step: usize,
    mask: usize,
}

impl ProbeSequence {
    /// Start probing at `hashcode & mask`.
    #[inline]
    pub fn new(hashcode: u32, mask: usize) -> Self {
        Self {
            pos: hashcode as usize & mask,
            step: 1,
            mask,
        }
    }
}

impl Iterator for ProbeSequence {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let pos = self.pos;
        self.pos = (self.pos + self.step) & self.mask;
        self.step += 1;
        Some(pos)
    }
}

/// Occupancy bits plus entry words.
#[derive(Debug)]
pub struct HashIndex {
    entries: LongArray,
    occupied: BitSet,
    capacity: usize,
    mask: usize,
}

impl HashIndex {
    /// Allocate an empty index of `capacity` slots (a power of two).
    pub fn allocate<A: MemoryAllocator + ?Sized>(allocator: &A, capacity: usize) -> Result<Self> {
        debug_assert!(capacity.is_power_of_two() && capacity >= MIN_CAPACITY);
        let entry_bytes = capacity
            .checked_mul(2 * WORD_SIZE)
            .ok_or(Error::CapacityExceeded { capacity })?;
        let entries = allocator.allocate(entry_bytes)?;
        let bits = match allocator.allocate(capacity.div_ceil(64) * WORD_SIZE) {
            Ok(bits) => bits,
            Err(e) => {
                allocator.free(entries);
                return Err(e);
            }
        };
        tracing::trace!(capacity, "allocated hash index");
        Ok(Self {
            entries: LongArray::new(entries),
            occupied: BitSet::new(bits),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `capacity - 1`.
    #[inline]
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// Bytes of allocator memory held by the index.
    pub fn memory_bytes(&self) -> usize {
        self.entries.len() * WORD_SIZE + self.occupied.capacity() / 8
    }

    /// Number of occupied slots, counted from the bit set.
    pub fn occupied_count(&self) -> usize {
        self.occupied.cardinality()
    }

    /// Whether slot `pos` holds an entry.
    #[inline]
    pub fn is_occupied(&self, pos: usize) -> bool {
        self.occupied.is_set(pos)
    }

    /// Encoded key address of slot `pos`.
    #[inline]
    pub fn key_word(&self, pos: usize) -> u64 {
        self.entries.get(pos * 2)
    }

    /// Packed value offset and hash code of slot `pos`.
    #[inline]
    pub fn value_word(&self, pos: usize) -> u64 {
        self.entries.get(pos * 2 + 1)
    }

    /// Fill an empty slot.
    #[inline]
    pub fn insert(&mut self, pos: usize, key_word: u64, value_word: u64) {
        debug_assert!(!self.occupied.is_set(pos), "slot {pos} already occupied");
        self.entries.set(pos * 2, key_word);
        self.entries.set(pos * 2 + 1, value_word);
        self.occupied.set(pos);
    }

    /// Probe for `hashcode`.
    ///
    /// Occupied slots whose stored hash code equals `hashcode` are handed to
    /// `is_match` for a full key comparison. Returns `(pos, true)` for the
    /// first accepted slot, or `(pos, false)` for the first free slot on the
    /// probe path, which is where the key belongs if it is inserted.
    pub fn find(&self, hashcode: u32, mut is_match: impl FnMut(usize) -> bool) -> (usize, bool) {
        for pos in ProbeSequence::new(hashcode, self.mask).take(self.capacity) {
            if !self.occupied.is_set(pos) {
                return (pos, false);
            }
            let (_, stored_hashcode) = unpack_value_word(self.value_word(pos));
            if stored_hashcode == hashcode && is_match(pos) {
                return (pos, true);
            }
        }
        unreachable!("hash index of {} slots has no free slot", self.capacity)
    }

    /// First free slot on the probe path of `hashcode`, without comparing keys.
    pub fn free_slot(&self, hashcode: u32) -> usize {
        ProbeSequence::new(hashcode, self.mask)
            .take(self.capacity)
            .find(|&pos| !self.occupied.is_set(pos))
            .unwrap_or_else(|| {
                unreachable!("hash index of {} slots has no free slot", self.capacity)
            })
    }

    /// Occupied slot numbers in ascending order.
    pub fn occupied_slots(&self) -> OccupiedSlots<'_> {
        OccupiedSlots {
            bits: &self.occupied,
            next: self.occupied.next_set_bit(0),
        }
    }

    /// Copy every entry into `target` (which must be empty), re-probing from
    /// each stored hash code. Keys are known to be distinct, so no comparison
    /// is made.
    pub fn rehash_into(&self, target: &mut HashIndex) {
        debug_assert_eq!(target.occupied_count(), 0);
        for pos in self.occupied_slots() {
            let key_word = self.key_word(pos);
            let value_word = self.value_word(pos);
            let (_, hashcode) = unpack_value_word(value_word);
            let new_pos = target.free_slot(hashcode);
            target.insert(new_pos, key_word, value_word);
        }
    }

    /// Hand both regions back to `allocator`.
    pub fn free<A: MemoryAllocator + ?Sized>(self, allocator: &A) {
        allocator.free(self.entries.into_memory_block());
        allocator.free(self.occupied.into_memory_block());
    }
}

/// Iterator over occupied slots, built on [`BitSet::next_set_bit`].
pub struct OccupiedSlots<'a> {
    bits: &'a BitSet,
    next: Option<usize>,
}

impl Iterator for OccupiedSlots<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let pos = self.next?;
        self.next = self.bits.next_set_bit(pos + 1);
        Some(pos)
    }
}
