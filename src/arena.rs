//! Page arena for key/value records.
//!
//! Records are bump-allocated into large fixed-size pages obtained from a
//! [`MemoryAllocator`]. A key and its value always share a page, so the index
//! only needs the key's address plus a 32-bit offset to the value.
//!
//! Individual records cannot be freed; pages are only released all at once.
//!
//! Record layout (every field starts on an 8-byte boundary):
//!
//! ```text
//! [key length: u64][key bytes, zero padded][value length: u64][value bytes, zero padded]
//! ```

use std::ptr;
use std::slice;

use crate::address::PageAddress;
use crate::error::{Error, Result};
use crate::memory::{AddressingMode, MemoryAllocator, MemoryBlock, WORD_SIZE};

/// Default data page size (64 MB).
pub const DEFAULT_PAGE_SIZE: usize = 64_000_000;

const PADDING: [u8; WORD_SIZE] = [0; WORD_SIZE];

#[inline]
fn padded_len(len: usize) -> Option<usize> {
    len.checked_next_multiple_of(WORD_SIZE)
}

/// Bytes taken by a record with the given payload lengths.
pub fn record_size(key_len: usize, value_len: usize) -> Option<usize> {
    padded_len(key_len)?
        .checked_add(padded_len(value_len)?)?
        .checked_add(2 * WORD_SIZE)
}

/// A bump allocator over fixed-size data pages.
///
/// `pages` doubles as the page table: a managed address's page number is an
/// index into it. In raw mode the table is only used to release the pages.
pub struct PageArena {
    mode: AddressingMode,
    pages: Vec<MemoryBlock>,
    /// Bytes consumed in the last page.
    cursor: usize,
    page_size: usize,
    max_pages: usize,
    used: usize,
}

impl PageArena {
    /// Create an empty arena. No page is allocated until the first record.
    pub fn new(mode: AddressingMode, page_size: usize, max_pages: usize) -> Self {
        debug_assert!(page_size % WORD_SIZE == 0);
        Self {
            mode,
            pages: Vec::new(),
            cursor: 0,
            page_size,
            max_pages,
            used: 0,
        }
    }

    /// Number of pages allocated so far.
    #[inline]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Size of each page in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total bytes held in pages.
    pub fn total_allocated(&self) -> usize {
        self.pages.iter().map(MemoryBlock::size).sum()
    }

    /// Bytes taken by records.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Size a record will take, or why it cannot be stored.
    pub fn check_fits(&self, key_len: usize, value_len: usize) -> Result<usize> {
        let too_large = |required| Error::RecordTooLarge {
            required,
            page_size: self.page_size,
        };
        let required = record_size(key_len, value_len).ok_or(too_large(usize::MAX))?;
        if required > self.page_size {
            return Err(too_large(required));
        }
        // The offset from key record to value record is kept in 32 bits.
        if WORD_SIZE + key_len.next_multiple_of(WORD_SIZE) > u32::MAX as usize {
            return Err(too_large(required));
        }
        Ok(required)
    }

    /// Copy a key and value onto the current page, opening a new page first if
    /// the record does not fit in what is left.
    ///
    /// Returns the address of the key length word and the byte offset from
    /// there to the value length word. Nothing changes if an error is returned.
    pub fn append<A: MemoryAllocator + ?Sized>(
        &mut self,
        allocator: &A,
        key: &[u8],
        value: &[u8],
    ) -> Result<(PageAddress, u32)> {
        let required = self.check_fits(key.len(), value.len())?;
        if self.pages.is_empty() || self.page_size - self.cursor < required {
            self.grow(allocator)?;
        }

        let page_number = self.pages.len() - 1;
        let key_at = self.cursor;
        let value_at = key_at + WORD_SIZE + key.len().next_multiple_of(WORD_SIZE);
        let end = key_at + required;
        let page = &mut self.pages[page_number];

        let key_end = key_at + WORD_SIZE + key.len();
        page.write_u64(key_at, key.len() as u64);
        page.write_bytes(key_at + WORD_SIZE, key);
        page.write_bytes(key_end, &PADDING[..value_at - key_end]);

        let value_end = value_at + WORD_SIZE + value.len();
        page.write_u64(value_at, value.len() as u64);
        page.write_bytes(value_at + WORD_SIZE, value);
        page.write_bytes(value_end, &PADDING[..end - value_end]);

        let key_address = match self.mode {
            AddressingMode::Managed => PageAddress::Managed {
                page: page_number,
                offset: key_at,
            },
            AddressingMode::Raw => PageAddress::Raw {
                address: page.base_offset() + key_at,
            },
        };

        self.cursor = end;
        self.used += required;
        Ok((key_address, (value_at - key_at) as u32))
    }

    fn grow<A: MemoryAllocator + ?Sized>(&mut self, allocator: &A) -> Result<()> {
        if self.pages.len() >= self.max_pages {
            return Err(Error::PageTableFull {
                max_pages: self.max_pages,
            });
        }
        let page = allocator.allocate(self.page_size)?;
        debug_assert_eq!(page.mode(), self.mode);
        debug_assert!(page.size() >= self.page_size);
        tracing::debug!(
            page = self.pages.len(),
            page_size = self.page_size,
            "allocated data page"
        );
        self.pages.push(page);
        self.cursor = 0;
        Ok(())
    }

    /// Length stored in the word at `addr`.
    ///
    /// # Safety
    /// `addr` must be the address of a length word written by
    /// [`append`](Self::append) on this arena.
    #[inline]
    pub unsafe fn payload_len(&self, addr: PageAddress) -> usize {
        match addr {
            PageAddress::Managed { page, offset } => self.pages[page].read_u64(offset) as usize,
            // SAFETY: the caller guarantees `address` is a length word inside a
            // page this arena still owns.
            PageAddress::Raw { address } => unsafe {
                ptr::read_unaligned(address as *const u64) as usize
            },
        }
    }

    /// Bytes following the length word at `addr`.
    ///
    /// # Safety
    /// Same contract as [`payload_len`](Self::payload_len).
    #[inline]
    pub unsafe fn payload(&self, addr: PageAddress) -> &[u8] {
        match addr {
            PageAddress::Managed { page, offset } => {
                let block = &self.pages[page];
                let len = block.read_u64(offset) as usize;
                block.bytes(offset + WORD_SIZE, len)
            }
            // SAFETY: the caller guarantees `address` is a length word inside a
            // page this arena still owns; `append` wrote `len` payload bytes
            // right after it. The borrow keeps the page alive.
            PageAddress::Raw { address } => unsafe {
                let len = ptr::read_unaligned(address as *const u64) as usize;
                if len == 0 {
                    return &[];
                }
                slice::from_raw_parts((address + WORD_SIZE) as *const u8, len)
            },
        }
    }

    /// Hand every page back to `allocator`.
    pub fn free_all<A: MemoryAllocator + ?Sized>(&mut self, allocator: &A) {
        for page in self.pages.drain(..) {
            allocator.free(page);
        }
        self.cursor = 0;
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HeapAllocator, RawAllocator};

    fn read_record(arena: &PageArena, key: PageAddress, offset: u32) -> (Vec<u8>, Vec<u8>) {
        unsafe {
            (
                arena.payload(key).to_vec(),
                arena.payload(key.add(offset as usize)).to_vec(),
            )
        }
    }

    fn check_append(allocator: &dyn MemoryAllocator) {
        let mut arena = PageArena::new(allocator.mode(), 4096, 16);
        assert_eq!(arena.num_pages(), 0);

        let (k1, off1) = arena.append(allocator, b"hello", b"world!!").unwrap();
        let (k2, off2) = arena.append(allocator, b"", b"abcdefgh").unwrap();
        assert_eq!(arena.num_pages(), 1);
        assert_eq!(off1, 16, "5-byte key pads to 8");
        assert_eq!(off2, 8);

        assert_eq!(read_record(&arena, k1, off1), (b"hello".to_vec(), b"world!!".to_vec()));
        assert_eq!(read_record(&arena, k2, off2), (b"".to_vec(), b"abcdefgh".to_vec()));
        assert_eq!(unsafe { arena.payload_len(k1) }, 5);
        assert_eq!(unsafe { arena.payload_len(k1.add(off1 as usize)) }, 7);
        assert_eq!(arena.used_bytes(), 32 + 24);

        arena.free_all(allocator);
        assert_eq!(arena.num_pages(), 0);
    }

    #[test]
    fn test_append_heap() {
        let allocator = HeapAllocator::new();
        check_append(&allocator);
        assert_eq!(allocator.stats().outstanding_blocks, 0);
    }

    #[test]
    fn test_append_raw() {
        let allocator = RawAllocator::new();
        check_append(&allocator);
        assert_eq!(allocator.stats().outstanding_blocks, 0);
    }

    #[test]
    fn test_managed_addresses_carry_page_numbers() {
        let allocator = HeapAllocator::new();
        let mut arena = PageArena::new(AddressingMode::Managed, 64, 8);
        let value = [7u8; 40];
        // Each record is 8 + 8 + 8 + 40 = 64 bytes: exactly one per page.
        for expected_page in 0..3 {
            let (addr, _) = arena.append(&allocator, b"k", &value).unwrap();
            assert_eq!(
                addr,
                PageAddress::Managed {
                    page: expected_page,
                    offset: 0
                }
            );
        }
        assert_eq!(arena.num_pages(), 3);
        assert_eq!(arena.total_allocated(), 3 * 64);
        arena.free_all(&allocator);
        assert_eq!(allocator.stats().outstanding_blocks, 0);
    }

    #[test]
    fn test_new_page_when_full() {
        let allocator = RawAllocator::new();
        let mut arena = PageArena::new(AddressingMode::Raw, 48, 8);
        let (a, off_a) = arena.append(&allocator, b"abcdefgh", b"12345678").unwrap();
        // 32 bytes used, 16 left: a 32-byte record must open a new page.
        let (b, off_b) = arena.append(&allocator, b"ABCDEFGH", b"87654321").unwrap();
        assert_eq!(arena.num_pages(), 2);
        assert_eq!(read_record(&arena, a, off_a).0, b"abcdefgh");
        assert_eq!(read_record(&arena, b, off_b).1, b"87654321");
        arena.free_all(&allocator);
        assert_eq!(allocator.stats().outstanding_blocks, 0);
    }

    #[test]
    fn test_record_too_large() {
        let allocator = HeapAllocator::new();
        let mut arena = PageArena::new(AddressingMode::Managed, 64, 8);
        let err = arena.append(&allocator, &[0u8; 40], &[0u8; 16]).unwrap_err();
        assert_eq!(
            err,
            Error::RecordTooLarge {
                required: 72,
                page_size: 64
            }
        );
        assert_eq!(arena.num_pages(), 0, "no page allocated for a rejected record");
        assert_eq!(allocator.stats().allocations, 0);
    }

    #[test]
    fn test_page_table_full() {
        let allocator = HeapAllocator::new();
        let mut arena = PageArena::new(AddressingMode::Managed, 32, 2);
        arena.append(&allocator, b"aaaaaaaa", b"aaaaaaaa").unwrap();
        arena.append(&allocator, b"bbbbbbbb", b"bbbbbbbb").unwrap();
        let err = arena.append(&allocator, b"cccccccc", b"cccccccc").unwrap_err();
        assert_eq!(err, Error::PageTableFull { max_pages: 2 });
        assert_eq!(arena.num_pages(), 2);
        assert_eq!(arena.used_bytes(), 64);
        arena.free_all(&allocator);
    }

    #[test]
    fn test_record_size() {
        assert_eq!(record_size(0, 0), Some(16));
        assert_eq!(record_size(8, 8), Some(32));
        assert_eq!(record_size(1, 9), Some(8 + 8 + 8 + 16));
        assert_eq!(record_size(usize::MAX, 0), None);
    }
}
