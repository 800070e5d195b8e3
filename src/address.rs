//! Key addresses and their 64-bit encoding in the hash index.
//!
//! Layout of an encoded managed address:
//! - Bits 63..51: page number (13 bits, at most [`MAX_PAGES`] pages)
//! - Bits 50..0:  byte offset within the page (at most [`MAX_PAGE_SIZE`] bytes)
//!
//! A raw address is stored unmodified; there is no page number to recover.
//! Which decoding applies is fixed by the map's [`AddressingMode`].

use crate::memory::AddressingMode;

/// Bits reserved for the page number of a managed address.
pub const PAGE_NUMBER_BITS: u32 = 13;

/// Bits reserved for the in-page offset of a managed address.
pub const OFFSET_BITS: u32 = 64 - PAGE_NUMBER_BITS;

/// Largest number of pages addressable in managed mode.
pub const MAX_PAGES: usize = 1 << PAGE_NUMBER_BITS;

/// Largest page size addressable in managed mode.
pub const MAX_PAGE_SIZE: u64 = 1 << OFFSET_BITS;

const OFFSET_MASK: u64 = MAX_PAGE_SIZE - 1;
const LOWER_32_BITS: u64 = 0xFFFF_FFFF;

/// Location of a byte inside the map's data pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageAddress {
    /// Page number plus byte offset; resolved through the page table.
    Managed {
        /// Index into the page table.
        page: usize,
        /// Byte offset from the start of the page.
        offset: usize,
    },
    /// Absolute address of the byte.
    Raw {
        /// Absolute address.
        address: usize,
    },
}

impl PageAddress {
    /// Pack into the single word kept in the hash index.
    #[inline]
    pub fn encode(self) -> u64 {
        match self {
            Self::Managed { page, offset } => {
                debug_assert!(page < MAX_PAGES, "page {page} out of range");
                debug_assert!(offset as u64 <= OFFSET_MASK, "offset {offset} out of range");
                ((page as u64) << OFFSET_BITS) | offset as u64
            }
            Self::Raw { address } => address as u64,
        }
    }

    /// Unpack a word produced by [`encode`](Self::encode) under `mode`.
    #[inline]
    pub fn decode(word: u64, mode: AddressingMode) -> Self {
        match mode {
            AddressingMode::Managed => Self::Managed {
                page: (word >> OFFSET_BITS) as usize,
                offset: (word & OFFSET_MASK) as usize,
            },
            AddressingMode::Raw => Self::Raw {
                address: word as usize,
            },
        }
    }

    /// The address `delta` bytes further into the same page.
    #[inline]
    pub fn add(self, delta: usize) -> Self {
        match self {
            Self::Managed { page, offset } => Self::Managed {
                page,
                offset: offset + delta,
            },
            Self::Raw { address } => Self::Raw {
                address: address + delta,
            },
        }
    }

    /// Page number, if this is a managed address.
    #[inline]
    pub fn page(self) -> Option<usize> {
        match self {
            Self::Managed { page, .. } => Some(page),
            Self::Raw { .. } => None,
        }
    }
}

/// Pack the second index word: offset from key record to value record in the
/// upper 32 bits, key hash code in the lower 32 bits.
#[inline]
pub fn pack_value_word(offset_to_value: u32, hashcode: u32) -> u64 {
    (u64::from(offset_to_value) << 32) | u64::from(hashcode)
}

/// Split a word built by [`pack_value_word`] into `(offset_to_value, hashcode)`.
#[inline]
pub fn unpack_value_word(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, (word & LOWER_32_BITS) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_constants() {
        assert_eq!(OFFSET_BITS, 51);
        assert_eq!(MAX_PAGES, 8192);
        assert_eq!(MAX_PAGE_SIZE, 1u64 << 51);
    }

    #[test]
    fn test_managed_encoding() {
        let addr = PageAddress::Managed {
            page: 5,
            offset: 1024,
        };
        let word = addr.encode();
        assert_eq!(word >> 51, 5);
        assert_eq!(word & ((1 << 51) - 1), 1024);
        assert_eq!(PageAddress::decode(word, AddressingMode::Managed), addr);
    }

    #[test]
    fn test_managed_extremes() {
        let addr = PageAddress::Managed {
            page: MAX_PAGES - 1,
            offset: OFFSET_MASK as usize,
        };
        assert_eq!(addr.encode(), u64::MAX);
        assert_eq!(PageAddress::decode(u64::MAX, AddressingMode::Managed), addr);

        let zero = PageAddress::Managed { page: 0, offset: 0 };
        assert_eq!(zero.encode(), 0);
    }

    #[test]
    fn test_raw_encoding_is_identity() {
        let addr = PageAddress::Raw {
            address: 0x7f00_dead_b000,
        };
        assert_eq!(addr.encode(), 0x7f00_dead_b000);
        assert_eq!(PageAddress::decode(0x7f00_dead_b000, AddressingMode::Raw), addr);
        assert_eq!(addr.page(), None);
    }

    #[test]
    fn test_add_stays_on_page() {
        let addr = PageAddress::Managed { page: 3, offset: 16 };
        assert_eq!(addr.add(24), PageAddress::Managed { page: 3, offset: 40 });
        assert_eq!(addr.add(24).page(), Some(3));
        assert_eq!(
            PageAddress::Raw { address: 4096 }.add(8),
            PageAddress::Raw { address: 4104 }
        );
    }

    #[test]
    fn test_value_word() {
        let word = pack_value_word(24, 0x8000_0001);
        assert_eq!(word, (24u64 << 32) | 0x8000_0001);
        assert_eq!(unpack_value_word(word), (24, 0x8000_0001));
        assert_eq!(unpack_value_word(pack_value_word(u32::MAX, 0)), (u32::MAX, 0));
    }
}
