//! # Oxbase - Teaching Database Storage Engine
//!
//! Oxbase implements the storage-engine primitives of a small disk-backed
//! database: a buffer pool with LRU-K replacement, an extendible hash table,
//! and a B+tree index with forward range iteration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │        B+Tree Index (btree)          │
//! ├──────────────────────────────────────┤
//! │    Buffer Pool Manager (buffer)      │
//! │  ┌────────────────┬───────────────┐  │
//! │  │ LRU-K Replacer │ Page Table    │  │
//! │  │ (buffer::lru_k)│ (hash)        │  │
//! │  └────────────────┴───────────────┘  │
//! ├──────────────────────────────────────┤
//! │      Disk Manager (storage)          │
//! └──────────────────────────────────────┘
//! ```
//!
//! The B+tree never touches the disk directly: it fetches pages from the
//! buffer pool, mutates them while pinned, and releases them through RAII
//! guards that carry the dirty flag back to the pool. The pool in turn uses
//! the extendible hash table as its page table (page id → frame) and the
//! LRU-K replacer to choose victim frames under memory pressure.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxbase::buffer::BufferPoolManager;
//! use oxbase::btree::{BPlusTree, BytewiseComparator, GenericKey, Rid};
//! use oxbase::storage::DiskManager;
//!
//! let disk = DiskManager::open("index.db")?;
//! let pool = Arc::new(BufferPoolManager::new(64, 2, disk)?);
//! let mut tree = BPlusTree::<BytewiseComparator, 8>::new(
//!     "orders_pk", Arc::clone(&pool), BytewiseComparator, 32, 32)?;
//!
//! tree.insert(&GenericKey::from_u64(42), Rid::new(7, 0))?;
//! assert!(tree.get_value(&GenericKey::from_u64(42))?.is_some());
//! ```
//!
//! ## Concurrency Contract
//!
//! The replacer and the hash table serialize every public operation on an
//! internal mutex and perform no I/O while holding it. The buffer pool is
//! safe to share across threads. The B+tree is **not**: structural changes
//! require external exclusion, and the pin protocol assumes one traversal
//! at a time per tree.
//!
//! ## Module Overview
//!
//! - [`buffer`]: buffer-pool manager, page guards, LRU-K replacer
//! - [`hash`]: extendible hash table
//! - [`btree`]: B+tree index, node layouts, range iterator
//! - [`storage`]: disk manager and header-page records
//! - [`config`]: page layout and pool constants

#[macro_use]
mod macros;

pub mod btree;
pub mod buffer;
pub mod config;
pub mod hash;
pub mod storage;

pub use btree::{BPlusTree, BytewiseComparator, GenericKey, KeyComparator, Rid, TreeIterator};
pub use buffer::{BufferPoolManager, LruKReplacer, PageGuard};
pub use config::{FrameId, PageId, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};
pub use hash::ExtendibleHashTable;
pub use storage::DiskManager;
