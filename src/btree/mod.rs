//! # B+Tree Module
//!
//! A disk-resident B+tree index over fixed-width keys, layered on the
//! buffer pool. Leaf pages hold the user's (key, record-id) pairs and are
//! chained for range scans; internal pages route lookups by separator keys.
//!
//! ## Layout
//!
//! Every tree page starts with a 16-byte [`page::NodeHeader`]; leaf pages
//! add a 4-byte next-leaf pointer. Entries are fixed width, so node views
//! are pure offset arithmetic over the pinned page bytes.
//!
//! ## Modules
//!
//! - [`key`]: `GenericKey<N>` fixed-width keys, comparators, record ids
//! - [`page`]: the shared node header and page-kind tag
//! - [`leaf`] / [`internal`]: typed views over leaf and internal pages
//! - [`tree`]: the tree itself - lookup, insert with split propagation,
//!   delete with redistribution and merge
//! - [`iterator`]: forward range iterator over the leaf chain

pub mod internal;
pub mod iterator;
pub mod key;
pub mod leaf;
pub mod page;
pub mod tree;

pub use internal::{InternalNode, InternalNodeMut};
pub use iterator::TreeIterator;
pub use key::{BytewiseComparator, GenericKey, KeyComparator, Rid};
pub use leaf::{LeafNode, LeafNodeMut, SearchResult};
pub use page::{NodeHeader, PageKind};
pub use tree::BPlusTree;
