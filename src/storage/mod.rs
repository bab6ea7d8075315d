//! # Storage Module
//!
//! The lowest layer of the engine: page-granular file I/O and the
//! header-page record table.
//!
//! ## Disk Manager
//!
//! [`DiskManager`] reads and writes whole pages at `page_id * PAGE_SIZE`
//! offsets in a single backing file. Reads past the end of the file
//! zero-fill the buffer, so a freshly allocated page arrives as all
//! zeroes without an explicit format step. The file grows lazily as
//! pages are written.
//!
//! ## Header Page
//!
//! Page 0 of every file is the header page: a small record table mapping
//! index names to their root page ids. An all-zero page is a valid empty
//! header page (count = 0), which is exactly what a fresh file reads as.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -------------------------------
//! 0       4     record count (u32)
//! 4       36    record 0: name[32] + root (u32)
//! 40      36    record 1
//! ...
//! ```
//!
//! ## Thread Safety
//!
//! `DiskManager` serializes file access on an internal mutex and is safe
//! to share. The header-page views borrow page bytes owned by the buffer
//! pool and follow its pin protocol.

mod disk;
mod header;

pub use disk::DiskManager;
pub use header::{HeaderPage, HeaderPageMut};
