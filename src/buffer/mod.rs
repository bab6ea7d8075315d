//! # Buffer Module
//!
//! The buffer pool and its replacement policy.
//!
//! ## Components
//!
//! - [`LruKReplacer`]: chooses victim frames by LRU-K access recency.
//! - [`BufferPoolManager`]: a fixed array of page frames, a page table
//!   mapping page ids to frames, and the pin protocol that keeps in-use
//!   pages resident.
//! - [`PageGuard`]: RAII handle to a pinned frame. Dropping the guard
//!   unpins the page exactly once, carrying the dirty flag set by
//!   `data_mut`.
//!
//! ## Pin Protocol
//!
//! A page must be pinned before its bytes are touched and stays pinned
//! until every guard on it is dropped. A pinned frame is never chosen as
//! an eviction victim. Guards make the balance structural: one fetch, one
//! unpin, on every path including early returns.

mod lru_k;
mod pool;

pub use lru_k::LruKReplacer;
pub use pool::{BufferPoolManager, PageGuard};
