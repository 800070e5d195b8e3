//! Error types for the `bytes-map` crate

/// Errors returned by map construction, insertion and the allocators.
///
/// Every operation that returns one of these leaves the map exactly as it was
/// before the call: no entry is written and `len()` does not change.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A value was already stored through this location.
    ///
    /// Keys are write-once: a location that resolved to a defined entry, or
    /// that has already been used to store one, cannot store again.
    #[error("can only set value once for a key")]
    AlreadyDefined,

    /// The encoded record does not fit in a single data page.
    ///
    /// Keys and values are stored contiguously on one page because the index
    /// only records the offset from key to value.
    #[error("record of {required} bytes does not fit in a page of {page_size} bytes")]
    RecordTooLarge {
        /// Bytes the record needs, including length words and padding.
        required: usize,
        /// Configured page size.
        page_size: usize,
    },

    /// The allocator could not provide a region of the requested size.
    #[error("failed to allocate {size} bytes")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
    },

    /// Every page id is in use.
    #[error("page table is full ({max_pages} pages)")]
    PageTableFull {
        /// Configured page limit.
        max_pages: usize,
    },

    /// The index cannot grow past its current capacity.
    #[error("hash index cannot grow beyond {capacity} slots")]
    CapacityExceeded {
        /// Capacity at the time growth was attempted.
        capacity: usize,
    },

    /// A construction parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
