//! # Storage Engine Constants
//!
//! All layout and sizing constants in one place. The page layout constants
//! are load-bearing: the B+tree node views and the header-page record table
//! compute offsets from them, and the compile-time assertions below keep the
//! derived values honest.
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (16 bytes, every B+tree page)
//!       │
//!       ├─> LEAF_HEADER_SIZE (4 bytes, next-leaf pointer, leaf pages only)
//!       │
//!       └─> HEADER_RECORD_* (header page record table, page 0)
//! ```

/// Identifies a slot in the buffer pool capable of holding one page.
pub type FrameId = usize;

/// Identifies a page in the backing file.
pub type PageId = u32;

/// Sentinel page id. Marks an absent root, the end of the leaf chain, and
/// the parent of the root page.
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// The header page holding index-name → root-page-id records. Reserved by
/// the page allocator; user pages start at 1.
pub const HEADER_PAGE_ID: PageId = 0;

/// Size of each database page in bytes. The fundamental unit of I/O,
/// caching, and pinning.
pub const PAGE_SIZE: usize = 4096;

/// Size of the B+tree node header present on every tree page.
pub const NODE_HEADER_SIZE: usize = 16;

/// Extra header bytes on leaf pages (the next-leaf pointer).
pub const LEAF_HEADER_SIZE: usize = 4;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default K for the LRU-K replacer. Two sightings are required before a
/// frame competes on backward-K-distance instead of first-touch recency.
pub const DEFAULT_REPLACER_K: usize = 2;

/// Bytes reserved for an index name in a header-page record.
pub const HEADER_RECORD_NAME_LEN: usize = 32;

/// Full size of one header-page record: name + root page id.
pub const HEADER_RECORD_SIZE: usize = HEADER_RECORD_NAME_LEN + 4;

/// Maximum records the header page can hold after its u32 count.
pub const HEADER_MAX_RECORDS: usize = (PAGE_SIZE - 4) / HEADER_RECORD_SIZE;

const _: () = assert!(
    HEADER_RECORD_SIZE == HEADER_RECORD_NAME_LEN + 4,
    "HEADER_RECORD_SIZE derivation mismatch"
);

const _: () = assert!(
    4 + HEADER_MAX_RECORDS * HEADER_RECORD_SIZE <= PAGE_SIZE,
    "header record table must fit a single page"
);

const _: () = assert!(
    PAGE_SIZE > NODE_HEADER_SIZE + LEAF_HEADER_SIZE,
    "pages must have room for entries after the node headers"
);
