//! The bytes-to-bytes hash map.

use std::fmt;

use crate::address::{pack_value_word, unpack_value_word, PageAddress};
use crate::arena::PageArena;
use crate::error::{Error, Result};
use crate::index::{normalize_capacity, GrowthStrategy, HashIndex, OccupiedSlots};
use crate::memory::{AddressingMode, MemoryAllocator, WORD_SIZE};
use crate::murmur3::Murmur3x86_32;
use crate::{Config, MemoryStats};

const HASHER: Murmur3x86_32 = Murmur3x86_32::new(0);

/// Load factor used by [`BytesToBytesMap::new`].
pub const DEFAULT_LOAD_FACTOR: f64 = 0.70;

#[inline]
pub(crate) fn growth_threshold(capacity: usize, load_factor: f64) -> usize {
    // At least one slot always stays free so probing terminates.
    ((capacity as f64 * load_factor) as usize).min(capacity - 1)
}

/// A hash map from byte strings to byte strings, stored in allocator memory.
///
/// Keys and values are copied into large data pages obtained from the
/// allocator; the hash index holds only a packed address and hash code per
/// entry, so no per-record objects are allocated. Whether that memory is
/// heap-owned or lives at raw addresses is fixed by the allocator the map is
/// built with.
///
/// Keys are write-once: there is no update or removal. All memory goes back to
/// the allocator on [`free`](Self::free) or drop.
///
/// Lookups go through a [`Location`], which mutably borrows the map. The
/// borrow is the location's contract: it describes one slot only until the next
/// call to [`lookup`](Self::lookup), and the compiler rejects any use past that.
pub struct BytesToBytesMap<'a, A: MemoryAllocator + ?Sized> {
    allocator: &'a A,
    mode: AddressingMode,
    arena: PageArena,
    /// Allocated on the first insertion.
    index: Option<HashIndex>,
    capacity: usize,
    load_factor: f64,
    growth_threshold: usize,
    growth_strategy: &'static dyn GrowthStrategy,
    size: usize,
}

impl<'a, A: MemoryAllocator + ?Sized> BytesToBytesMap<'a, A> {
    /// Create a map with room for `initial_capacity` slots (rounded up to a
    /// power of two, at least 64) and the default load factor of 0.70.
    pub fn new(allocator: &'a A, initial_capacity: usize) -> Result<Self> {
        Self::with_config(
            allocator,
            Config {
                initial_capacity,
                ..Config::default()
            },
        )
    }

    /// Create a map with an explicit load factor.
    pub fn with_load_factor(
        allocator: &'a A,
        initial_capacity: usize,
        load_factor: f64,
    ) -> Result<Self> {
        Self::with_config(
            allocator,
            Config {
                initial_capacity,
                load_factor,
                ..Config::default()
            },
        )
    }

    /// Create a map from a full configuration.
    pub fn with_config(allocator: &'a A, config: Config) -> Result<Self> {
        config.validate()?;
        let capacity = normalize_capacity(config.initial_capacity)
            .ok_or(Error::InvalidConfig("initial capacity too large"))?;
        let mode = allocator.mode();
        Ok(Self {
            allocator,
            mode,
            arena: PageArena::new(mode, config.page_size, config.max_pages),
            index: None,
            capacity,
            load_factor: config.load_factor,
            growth_threshold: growth_threshold(capacity, config.load_factor),
            growth_strategy: config.growth_strategy,
            size: 0,
        })
    }

    /// Number of keys defined in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// `true` if no key is defined.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of slots in the hash index.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Addressing mode taken from the allocator at construction.
    #[inline]
    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Number of data pages allocated so far.
    #[inline]
    pub fn num_pages(&self) -> usize {
        self.arena.num_pages()
    }

    /// Look up `key`.
    ///
    /// The returned [`Location`] is either defined (the key is present) or
    /// points at the free slot where the key would be inserted. Keys are
    /// matched on the full 32-bit hash code and then byte for byte.
    pub fn lookup(&mut self, key: &[u8]) -> Location<'_, 'a, A> {
        let (pos, hashcode, defined) = self.probe(key);
        Location {
            map: self,
            pos,
            hashcode,
            defined,
        }
    }

    /// Value stored for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let (pos, _, defined) = self.probe(key);
        defined.then(|| self.entry_at(pos).1)
    }

    /// `true` if `key` is defined.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.probe(key).2
    }

    /// Iterate over `(key, value)` pairs in slot order.
    pub fn iter(&self) -> Iter<'_, 'a, A> {
        Iter {
            map: self,
            slots: self.index.as_ref().map(HashIndex::occupied_slots),
            remaining: self.size,
        }
    }

    /// Memory held by the map.
    pub fn memory_usage(&self) -> MemoryStats {
        let index_bytes = self.index.as_ref().map_or(0, HashIndex::memory_bytes);
        let page_bytes = self.arena.total_allocated();
        MemoryStats {
            index_bytes,
            page_bytes,
            used_page_bytes: self.arena.used_bytes(),
            num_pages: self.arena.num_pages(),
            num_keys: self.size,
            bytes_per_key: if self.size > 0 {
                (index_bytes + page_bytes) as f64 / self.size as f64
            } else {
                0.0
            },
        }
    }

    /// Release the hash index and every data page.
    ///
    /// Dropping the map does the same; this makes the point of release explicit.
    pub fn free(self) {
        drop(self);
    }

    fn probe(&self, key: &[u8]) -> (usize, u32, bool) {
        let hashcode = HASHER.hash_bytes(key);
        let Some(index) = &self.index else {
            return (hashcode as usize & (self.capacity - 1), hashcode, false);
        };
        let (pos, defined) = index.find(hashcode, |pos| {
            let addr = PageAddress::decode(index.key_word(pos), self.mode);
            // SAFETY: occupied slots only hold addresses returned by
            // `PageArena::append` on this map's arena, whose pages are alive.
            unsafe { self.arena.payload(addr) == key }
        });
        (pos, hashcode, defined)
    }

    /// Addresses of the key and value length words of an occupied slot.
    fn record_addresses(&self, pos: usize) -> (PageAddress, PageAddress) {
        let Some(index) = &self.index else {
            unreachable!("slot {pos} is defined but no index is allocated")
        };
        debug_assert!(index.is_occupied(pos));
        let key = PageAddress::decode(index.key_word(pos), self.mode);
        let (offset_to_value, _) = unpack_value_word(index.value_word(pos));
        (key, key.add(offset_to_value as usize))
    }

    fn entry_at(&self, pos: usize) -> (&[u8], &[u8]) {
        let (key, value) = self.record_addresses(pos);
        // SAFETY: both addresses come from an occupied slot; see `probe`.
        unsafe { (self.arena.payload(key), self.arena.payload(value)) }
    }

    fn lengths_at(&self, pos: usize) -> (usize, usize) {
        let (key, value) = self.record_addresses(pos);
        // SAFETY: both addresses come from an occupied slot; see `probe`.
        unsafe { (self.arena.payload_len(key), self.arena.payload_len(value)) }
    }

    fn ensure_index(&mut self) -> Result<&mut HashIndex> {
        match &mut self.index {
            Some(index) => Ok(index),
            slot @ None => Ok(slot.insert(HashIndex::allocate(self.allocator, self.capacity)?)),
        }
    }

    /// Insert at free slot `pos` and return the slot the entry ended up in,
    /// which differs from `pos` when the index grew first.
    fn store(&mut self, mut pos: usize, hashcode: u32, key: &[u8], value: &[u8]) -> Result<usize> {
        debug_assert_eq!(
            HASHER.hash_bytes(key),
            hashcode,
            "stored key differs from the key that was looked up"
        );
        self.arena.check_fits(key.len(), value.len())?;
        self.ensure_index()?;

        if self.size + 1 > self.growth_threshold {
            self.grow_and_rehash()?;
            if self.size + 1 > self.growth_threshold {
                return Err(Error::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
            pos = self.ensure_index()?.free_slot(hashcode);
        }

        let (key_address, offset_to_value) = self.arena.append(self.allocator, key, value)?;
        self.ensure_index()?
            .insert(pos, key_address.encode(), pack_value_word(offset_to_value, hashcode));
        self.size += 1;
        Ok(pos)
    }

    /// Grow the index and re-insert every entry from its stored hash code.
    /// Key and value bytes stay where they are in the data pages.
    fn grow_and_rehash(&mut self) -> Result<()> {
        let old_capacity = self.capacity;
        let new_capacity = normalize_capacity(self.growth_strategy.next_capacity(old_capacity))
            .filter(|&c| c > old_capacity)
            .ok_or(Error::CapacityExceeded {
                capacity: old_capacity,
            })?;

        let mut grown = HashIndex::allocate(self.allocator, new_capacity)?;
        if let Some(old) = self.index.take() {
            old.rehash_into(&mut grown);
            old.free(self.allocator);
        }
        tracing::debug!(old_capacity, new_capacity, entries = self.size, "grew hash index");

        self.index = Some(grown);
        self.capacity = new_capacity;
        self.growth_threshold = growth_threshold(new_capacity, self.load_factor);
        Ok(())
    }
}

impl<A: MemoryAllocator + ?Sized> Drop for BytesToBytesMap<'_, A> {
    fn drop(&mut self) {
        if let Some(index) = self.index.take() {
            index.free(self.allocator);
        }
        self.arena.free_all(self.allocator);
        tracing::trace!(entries = self.size, "released map memory");
    }
}

impl<A: MemoryAllocator + ?Sized> fmt::Debug for BytesToBytesMap<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesToBytesMap")
            .field("mode", &self.mode)
            .field("len", &self.size)
            .field("capacity", &self.capacity)
            .field("num_pages", &self.arena.num_pages())
            .finish()
    }
}

/// Result of [`BytesToBytesMap::lookup`]: one slot of the index.
///
/// A location is either *defined*, holding the looked-up key and its value,
/// or *undefined*, marking where that key would go. An undefined location can
/// store a key and value once, after which it is defined. The accessors return
/// `None` on an undefined location.
pub struct Location<'m, 'a, A: MemoryAllocator + ?Sized> {
    map: &'m mut BytesToBytesMap<'a, A>,
    pos: usize,
    hashcode: u32,
    defined: bool,
}

impl<A: MemoryAllocator + ?Sized> Location<'_, '_, A> {
    /// `true` if the key is defined at this position.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Index slot this location refers to.
    #[inline]
    pub fn slot(&self) -> usize {
        self.pos
    }

    /// Hash code of the looked-up key.
    #[inline]
    pub fn hashcode(&self) -> u32 {
        self.hashcode
    }

    /// Store `key` and `value` at this location.
    ///
    /// `key` must be the key that was looked up. Fails with
    /// [`Error::AlreadyDefined`] if the key is already present; on any error
    /// the map is unchanged.
    pub fn store_key_and_value(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.defined {
            return Err(Error::AlreadyDefined);
        }
        self.pos = self.map.store(self.pos, self.hashcode, key, value)?;
        self.defined = true;
        Ok(())
    }

    /// Address of the first key byte.
    pub fn key_address(&self) -> Option<PageAddress> {
        self.defined
            .then(|| self.map.record_addresses(self.pos).0.add(WORD_SIZE))
    }

    /// Length of the key in bytes.
    pub fn key_length(&self) -> Option<usize> {
        self.defined.then(|| self.map.lengths_at(self.pos).0)
    }

    /// Address of the first value byte.
    pub fn value_address(&self) -> Option<PageAddress> {
        self.defined
            .then(|| self.map.record_addresses(self.pos).1.add(WORD_SIZE))
    }

    /// Length of the value in bytes.
    pub fn value_length(&self) -> Option<usize> {
        self.defined.then(|| self.map.lengths_at(self.pos).1)
    }

    /// The stored key.
    pub fn key(&self) -> Option<&[u8]> {
        self.defined.then(|| self.map.entry_at(self.pos).0)
    }

    /// The stored value.
    pub fn value(&self) -> Option<&[u8]> {
        self.defined.then(|| self.map.entry_at(self.pos).1)
    }
}

impl<A: MemoryAllocator + ?Sized> fmt::Debug for Location<'_, '_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("pos", &self.pos)
            .field("hashcode", &self.hashcode)
            .field("defined", &self.defined)
            .finish()
    }
}

/// Iterator over the entries of a [`BytesToBytesMap`].
pub struct Iter<'m, 'a, A: MemoryAllocator + ?Sized> {
    map: &'m BytesToBytesMap<'a, A>,
    slots: Option<OccupiedSlots<'m>>,
    remaining: usize,
}

impl<'m, A: MemoryAllocator + ?Sized> Iterator for Iter<'m, '_, A> {
    type Item = (&'m [u8], &'m [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.slots.as_mut()?.next()?;
        self.remaining -= 1;
        Some(self.map.entry_at(pos))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<A: MemoryAllocator + ?Sized> ExactSizeIterator for Iter<'_, '_, A> {}
