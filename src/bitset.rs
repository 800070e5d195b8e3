//! Fixed-size occupancy bit set over a [`MemoryBlock`].
//!
//! Each bit occupies exactly one bit of storage; the block must be a whole
//! number of 64-bit words.

use crate::memory::{MemoryBlock, WORD_SIZE};

/// A fixed-capacity bit set stored in a word-aligned memory block.
#[derive(Debug)]
pub struct BitSet {
    memory: MemoryBlock,
    num_words: usize,
}

impl BitSet {
    /// Wrap `memory` and clear every bit.
    ///
    /// # Panics
    /// Panics if the block size is not a multiple of the word size.
    pub fn new(mut memory: MemoryBlock) -> Self {
        assert!(
            memory.size() % WORD_SIZE == 0,
            "memory not aligned ({})",
            memory.size()
        );
        memory.fill(0);
        let num_words = memory.size() / WORD_SIZE;
        Self { memory, num_words }
    }

    /// Number of bits this set can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_words * 64
    }

    #[inline]
    fn word(&self, wi: usize) -> u64 {
        self.memory.read_u64(wi * WORD_SIZE)
    }

    #[inline]
    fn locate(&self, index: usize) -> (usize, u64) {
        debug_assert!(
            index < self.capacity(),
            "index ({index}) should < capacity ({})",
            self.capacity()
        );
        (index >> 6, 1u64 << (index & 0x3f))
    }

    /// Sets the bit at `index`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        let (wi, mask) = self.locate(index);
        let word = self.word(wi);
        self.memory.write_u64(wi * WORD_SIZE, word | mask);
    }

    /// Clears the bit at `index`.
    #[inline]
    pub fn unset(&mut self, index: usize) {
        let (wi, mask) = self.locate(index);
        let word = self.word(wi);
        self.memory.write_u64(wi * WORD_SIZE, word & !mask);
    }

    /// Returns `true` if the bit at `index` is set.
    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        let (wi, mask) = self.locate(index);
        self.word(wi) & mask != 0
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.memory.fill(0);
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        (0..self.num_words)
            .map(|wi| self.word(wi).count_ones() as usize)
            .sum()
    }

    /// Index of the first set bit at or after `from` (inclusive).
    ///
    /// To visit every set bit:
    ///
    /// ```
    /// # use bytes_map::{BitSet, HeapAllocator, MemoryAllocator};
    /// # let allocator = HeapAllocator::new();
    /// # let mut bits = BitSet::new(allocator.allocate(8).unwrap());
    /// # bits.set(3);
    /// # bits.set(40);
    /// let mut seen = Vec::new();
    /// let mut next = bits.next_set_bit(0);
    /// while let Some(i) = next {
    ///     seen.push(i);
    ///     next = bits.next_set_bit(i + 1);
    /// }
    /// assert_eq!(seen, [3, 40]);
    /// ```
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut wi = from >> 6;
        if wi >= self.num_words {
            return None;
        }

        // Mask off the bits below `from` in its word.
        let sub_index = from & 0x3f;
        let word = self.word(wi) >> sub_index;
        if word != 0 {
            return Some((wi << 6) + sub_index + word.trailing_zeros() as usize);
        }

        wi += 1;
        while wi < self.num_words {
            let word = self.word(wi);
            if word != 0 {
                return Some((wi << 6) + word.trailing_zeros() as usize);
            }
            wi += 1;
        }

        None
    }

    /// Give back the underlying block.
    pub fn into_memory_block(self) -> MemoryBlock {
        self.memory
    }
}
