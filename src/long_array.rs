//! An array of `u64` values over a [`MemoryBlock`].
//!
//! Compared with a `Vec<u64>` this works on both heap-backed and raw memory
//! and carries no capacity of its own; the block decides the length.

use crate::memory::{MemoryBlock, WORD_SIZE};

/// Index-addressed view of a block as `size / 8` words.
#[derive(Debug)]
pub struct LongArray {
    memory: MemoryBlock,
    length: usize,
}

impl LongArray {
    /// Wrap `memory`.
    ///
    /// # Panics
    /// Panics if the block size is not a multiple of the word size.
    pub fn new(memory: MemoryBlock) -> Self {
        assert!(
            memory.size() % WORD_SIZE == 0,
            "memory not aligned ({})",
            memory.size()
        );
        let length = memory.size() / WORD_SIZE;
        Self { memory, length }
    }

    /// Number of elements this array can hold.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// `true` if the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sets the value at `index`.
    #[inline]
    pub fn set(&mut self, index: usize, value: u64) {
        debug_assert!(
            index < self.length,
            "index ({index}) should < length ({})",
            self.length
        );
        self.memory.write_u64(index * WORD_SIZE, value);
    }

    /// Returns the value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        debug_assert!(
            index < self.length,
            "index ({index}) should < length ({})",
            self.length
        );
        self.memory.read_u64(index * WORD_SIZE)
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: u64) {
        for i in 0..self.length {
            self.set(i, value);
        }
    }

    /// Give back the underlying block.
    pub fn into_memory_block(self) -> MemoryBlock {
        self.memory
    }
}
