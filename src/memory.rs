//! Memory regions and the allocators that produce them.
//!
//! A [`MemoryBlock`] is a contiguous byte range that is either backed by a
//! heap-owned word array (managed mode) or by a raw address obtained from the
//! C allocator (raw mode). Both kinds are read and written through the same
//! methods, so the structures built on top of them (bit sets, word arrays, data
//! pages) do not care which allocator produced their storage.
//!
//! Ownership is explicit: a block is handed back to the allocator that created
//! it with [`MemoryAllocator::free`]. Mixing blocks between allocators, or
//! dropping a raw block without freeing it, leaks or corrupts memory.

use std::cell::Cell;
use std::ptr;
use std::slice;

use crate::error::{Error, Result};

/// Width of a machine word in bytes. Index and page regions are multiples of it.
pub const WORD_SIZE: usize = 8;

/// How addresses into a block's memory are formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Memory is owned by a heap array; addresses are `(page, offset)` pairs
    /// and must go through the page table.
    Managed,
    /// Memory lives at a fixed absolute address; addresses are used as-is.
    Raw,
}

/// A contiguous region of memory plus its size.
///
/// In managed mode `obj` owns the backing words and `offset` is always zero.
/// In raw mode `obj` is `None` and `offset` is the absolute address of the
/// first byte.
pub struct MemoryBlock {
    obj: Option<Box<[u64]>>,
    offset: usize,
    length: usize,
}

impl MemoryBlock {
    /// Wrap a heap word array. The block is `words.len() * 8` bytes long.
    pub fn from_words(words: Box<[u64]>) -> Self {
        let length = words.len() * WORD_SIZE;
        Self {
            obj: Some(words),
            offset: 0,
            length,
        }
    }

    /// Wrap `length` bytes starting at a raw address.
    ///
    /// # Safety
    ///
    /// `address` must be valid for reads and writes of `length` bytes and must
    /// stay valid, and not be accessed through any other path, until the block
    /// is released by the allocator that produced it.
    pub unsafe fn from_address(address: usize, length: usize) -> Self {
        Self {
            obj: None,
            offset: address,
            length,
        }
    }

    /// Addressing mode implied by how this block is backed.
    #[inline]
    pub fn mode(&self) -> AddressingMode {
        if self.obj.is_some() {
            AddressingMode::Managed
        } else {
            AddressingMode::Raw
        }
    }

    /// Size of the region in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.length
    }

    /// Offset of the first byte: zero for managed blocks, the absolute
    /// address for raw blocks.
    #[inline]
    pub fn base_offset(&self) -> usize {
        self.offset
    }

    /// Take back the heap words of a managed block.
    pub fn into_words(self) -> Option<Box<[u64]>> {
        self.obj
    }

    #[inline]
    pub(crate) fn base_ptr(&self) -> *const u8 {
        match &self.obj {
            Some(words) => words.as_ptr().cast(),
            None => self.offset as *const u8,
        }
    }

    #[inline]
    fn base_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.obj {
            Some(words) => words.as_mut_ptr().cast(),
            None => self.offset as *mut u8,
        }
    }

    #[inline]
    fn check_range(&self, at: usize, len: usize) {
        assert!(
            at.checked_add(len).is_some_and(|end| end <= self.length),
            "range {at}..{at}+{len} out of bounds for block of {} bytes",
            self.length
        );
    }

    /// Read the 64-bit word starting at byte offset `at`.
    #[inline]
    pub fn read_u64(&self, at: usize) -> u64 {
        self.check_range(at, WORD_SIZE);
        // SAFETY: the range is inside the block, which owns `length` bytes.
        unsafe { ptr::read_unaligned(self.base_ptr().add(at).cast::<u64>()) }
    }

    /// Write a 64-bit word at byte offset `at`.
    #[inline]
    pub fn write_u64(&mut self, at: usize, value: u64) {
        self.check_range(at, WORD_SIZE);
        // SAFETY: the range is inside the block, which owns `length` bytes.
        unsafe { ptr::write_unaligned(self.base_mut_ptr().add(at).cast::<u64>(), value) }
    }

    /// Borrow `len` bytes starting at `at`.
    ///
    /// Raw blocks are not zeroed on allocation, so only ranges that were
    /// written earlier hold meaningful data.
    #[inline]
    pub fn bytes(&self, at: usize, len: usize) -> &[u8] {
        self.check_range(at, len);
        if len == 0 {
            return &[];
        }
        // SAFETY: the range is inside the block and the borrow is tied to `self`.
        unsafe { slice::from_raw_parts(self.base_ptr().add(at), len) }
    }

    /// Copy `src` into the block starting at `at`.
    #[inline]
    pub fn write_bytes(&mut self, at: usize, src: &[u8]) {
        self.check_range(at, src.len());
        if src.is_empty() {
            return;
        }
        // SAFETY: the destination range is inside the block; `src` is a
        // separate borrow so the two cannot overlap.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.base_mut_ptr().add(at), src.len()) }
    }

    /// Set every byte of the block to `byte`.
    pub fn fill(&mut self, byte: u8) {
        if self.length == 0 {
            return;
        }
        // SAFETY: writes exactly the `length` bytes the block owns.
        unsafe { ptr::write_bytes(self.base_mut_ptr(), byte, self.length) }
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("mode", &self.mode())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

/// Produces and releases [`MemoryBlock`]s.
///
/// An allocator fixes the [`AddressingMode`] of everything built on its
/// blocks. Blocks are not guaranteed to be zeroed.
pub trait MemoryAllocator {
    /// Addressing mode of every block this allocator hands out.
    fn mode(&self) -> AddressingMode;

    /// Allocate a block of at least `size` bytes, rounded up to whole words.
    fn allocate(&self, size: usize) -> Result<MemoryBlock>;

    /// Release a block previously returned by [`allocate`](Self::allocate).
    fn free(&self, block: MemoryBlock);
}

/// Snapshot of an allocator's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Successful allocations so far.
    pub allocations: usize,
    /// Blocks released so far.
    pub frees: usize,
    /// Blocks allocated and not yet released.
    pub outstanding_blocks: usize,
    /// Bytes allocated and not yet released.
    pub outstanding_bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    allocations: Cell<usize>,
    frees: Cell<usize>,
    outstanding_bytes: Cell<usize>,
}

impl Counters {
    fn on_allocate(&self, size: usize) {
        self.allocations.set(self.allocations.get() + 1);
        self.outstanding_bytes.set(self.outstanding_bytes.get() + size);
    }

    fn on_free(&self, size: usize) {
        debug_assert!(self.frees.get() < self.allocations.get(), "double free");
        self.frees.set(self.frees.get() + 1);
        self.outstanding_bytes
            .set(self.outstanding_bytes.get().saturating_sub(size));
    }

    fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            allocations: self.allocations.get(),
            frees: self.frees.get(),
            outstanding_blocks: self.allocations.get() - self.frees.get(),
            outstanding_bytes: self.outstanding_bytes.get(),
        }
    }
}

#[inline]
fn word_aligned_size(size: usize) -> Result<usize> {
    size.checked_next_multiple_of(WORD_SIZE)
        .ok_or(Error::AllocationFailed { size })
}

/// Allocates blocks backed by heap-owned `u64` arrays (managed mode).
#[derive(Debug, Default)]
pub struct HeapAllocator {
    counters: Counters,
}

impl HeapAllocator {
    /// Create an allocator with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current allocation counters.
    pub fn stats(&self) -> AllocatorStats {
        self.counters.snapshot()
    }
}

impl MemoryAllocator for HeapAllocator {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Managed
    }

    fn allocate(&self, size: usize) -> Result<MemoryBlock> {
        let words = word_aligned_size(size)? / WORD_SIZE;
        let mut data: Vec<u64> = Vec::new();
        data.try_reserve_exact(words)
            .map_err(|_| Error::AllocationFailed { size })?;
        data.resize(words, 0);
        let block = MemoryBlock::from_words(data.into_boxed_slice());
        self.counters.on_allocate(block.size());
        Ok(block)
    }

    fn free(&self, block: MemoryBlock) {
        debug_assert_eq!(block.mode(), AddressingMode::Managed);
        self.counters.on_free(block.size());
        drop(block.into_words());
    }
}

/// Allocates blocks at raw addresses from the C allocator (raw mode).
#[derive(Debug, Default)]
pub struct RawAllocator {
    counters: Counters,
}

impl RawAllocator {
    /// Create an allocator with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current allocation counters.
    pub fn stats(&self) -> AllocatorStats {
        self.counters.snapshot()
    }
}

impl MemoryAllocator for RawAllocator {
    fn mode(&self) -> AddressingMode {
        AddressingMode::Raw
    }

    fn allocate(&self, size: usize) -> Result<MemoryBlock> {
        let length = word_aligned_size(size)?;
        // SAFETY: malloc has no preconditions; a null return is handled below.
        let address = unsafe { libc::malloc(length.max(1)) };
        if address.is_null() {
            return Err(Error::AllocationFailed { size });
        }
        // SAFETY: `address` is a fresh allocation of at least `length` bytes,
        // owned by the block until it comes back through `free`.
        let block = unsafe { MemoryBlock::from_address(address as usize, length) };
        self.counters.on_allocate(block.size());
        Ok(block)
    }

    fn free(&self, block: MemoryBlock) {
        debug_assert_eq!(block.mode(), AddressingMode::Raw);
        self.counters.on_free(block.size());
        // SAFETY: raw blocks are only created by `allocate` above, so the
        // address came from malloc and has not been freed yet.
        unsafe { libc::free(block.base_offset() as *mut libc::c_void) }
    }
}
