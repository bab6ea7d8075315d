//! Shared page header for B+tree nodes.
//!
//! Every tree page, leaf or internal, begins with this 16-byte header:
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  ---------------------------------------
//! 0       4     page_id         This page's id in the file
//! 4       4     parent_page_id  Parent page, INVALID_PAGE_ID for root
//! 8       1     page_kind       Leaf or Internal
//! 9       3     reserved
//! 12      2     size            Entries currently stored
//! 14      2     max_size        Entry capacity (the tree's fanout)
//! ```
//!
//! Leaf pages follow the header with a 4-byte next-leaf pointer, then the
//! entry array; internal pages go straight to entries. A page read from a
//! fresh file is all zeroes, which decodes as `PageKind::Invalid` and is
//! rejected by the node views.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Invalid = 0x00,
    Leaf = 0x01,
    Internal = 0x02,
}

impl PageKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => PageKind::Leaf,
            0x02 => PageKind::Internal,
            _ => PageKind::Invalid,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    page_id: U32,
    parent_page_id: U32,
    page_kind: u8,
    reserved: [u8; 3],
    size: U16,
    max_size: U16,
}

impl NodeHeader {
    zerocopy_accessors! {
        page_id: u32,
        parent_page_id: u32,
        size: u16,
        max_size: u16,
    }

    pub fn page_kind(&self) -> PageKind {
        PageKind::from_byte(self.page_kind)
    }

    pub fn set_page_kind(&mut self, kind: PageKind) {
        self.page_kind = kind as u8;
    }

    pub fn is_leaf(&self) -> bool {
        self.page_kind() == PageKind::Leaf
    }

    /// Minimum occupancy of a non-root page: ceil(max / 2).
    pub fn min_size(&self) -> u16 {
        self.max_size().div_ceil(2)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::ref_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::mut_from_bytes(&mut data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }
}
