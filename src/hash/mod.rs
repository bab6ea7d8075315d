//! # Hash Module
//!
//! An in-memory extendible hash table. The buffer pool uses it as its page
//! table (page id → frame id); it also stands on its own as an associative
//! container that grows by splitting buckets instead of rehashing the world.

mod extendible;

pub use extendible::ExtendibleHashTable;
