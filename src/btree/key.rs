//! Fixed-width keys, comparators, and record identifiers.
//!
//! Keys are opaque `N`-byte arrays compared through a caller-supplied
//! [`KeyComparator`]; the tree never interprets key bytes itself. The stock
//! [`BytewiseComparator`] is a plain memcmp, which sorts integers encoded
//! with [`GenericKey::from_u64`] numerically (big-endian is
//! order-preserving for unsigned values).
//!
//! Values stored at the leaf level are [`Rid`]s: the (page, slot) address
//! of a record in some table heap. The tree treats them as opaque payload.

use std::cmp::Ordering;
use std::fmt;

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::PageId;

/// Bytes occupied by a [`Rid`] in a leaf entry.
pub const RID_SIZE: usize = 8;

/// A fixed-width index key of `N` bytes.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn zeroed() -> Self {
        Self { data: [0u8; N] }
    }

    /// Builds a key from raw bytes, zero-padding or truncating to `N`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Encodes an unsigned integer so that bytewise order matches numeric
    /// order. Keys narrower than 8 bytes keep the low-order bytes; the
    /// value must fit or ordering breaks.
    pub fn from_u64(value: u64) -> Self {
        let mut data = [0u8; N];
        let be = value.to_be_bytes();
        if N >= 8 {
            data[..8].copy_from_slice(&be);
        } else {
            data.copy_from_slice(&be[8 - N..]);
        }
        Self { data }
    }

    /// Inverse of [`from_u64`](Self::from_u64) for display and tests.
    pub fn to_u64(&self) -> u64 {
        let mut be = [0u8; 8];
        if N >= 8 {
            be.copy_from_slice(&self.data[..8]);
        } else {
            be[8 - N..].copy_from_slice(&self.data);
        }
        u64::from_be_bytes(be)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>({})", N, self.to_u64())
    }
}

impl<const N: usize> fmt::Display for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u64())
    }
}

/// Total order over `N`-byte keys.
pub trait KeyComparator<const N: usize> {
    fn compare(&self, lhs: &GenericKey<N>, rhs: &GenericKey<N>) -> Ordering;
}

/// Plain memcmp ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl<const N: usize> KeyComparator<N> for BytewiseComparator {
    fn compare(&self, lhs: &GenericKey<N>, rhs: &GenericKey<N>) -> Ordering {
        lhs.data.cmp(&rhs.data)
    }
}

/// Record identifier: the (page, slot) address of a row. Opaque to the
/// tree; stored verbatim in leaf entries.
#[repr(C)]
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct Rid {
    page_id: U32,
    slot: U32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self {
            page_id: U32::new(page_id),
            slot: U32::new(slot),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.get()
    }

    pub fn slot(&self) -> u32 {
        self.slot.get()
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_id.get(), self.slot.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_is_8_bytes() {
        assert_eq!(size_of::<Rid>(), RID_SIZE);
    }

    #[test]
    fn from_u64_preserves_order_bytewise() {
        let cmp = BytewiseComparator;
        let values = [0u64, 1, 2, 255, 256, 65535, 1 << 20, u32::MAX as u64];
        for window in values.windows(2) {
            let a = GenericKey::<8>::from_u64(window[0]);
            let b = GenericKey::<8>::from_u64(window[1]);
            assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        }
    }

    #[test]
    fn narrow_keys_round_trip_small_values() {
        let key = GenericKey::<4>::from_u64(0xAABBCC);
        assert_eq!(key.to_u64(), 0xAABBCC);
    }

    #[test]
    fn wide_keys_round_trip() {
        for n in [0u64, 7, u64::MAX] {
            assert_eq!(GenericKey::<16>::from_u64(n).to_u64(), n);
            assert_eq!(GenericKey::<8>::from_u64(n).to_u64(), n);
        }
    }

    #[test]
    fn from_bytes_pads_and_truncates() {
        let short = GenericKey::<8>::from_bytes(b"ab");
        assert_eq!(short.as_bytes(), b"ab\0\0\0\0\0\0");

        let long = GenericKey::<4>::from_bytes(b"abcdef");
        assert_eq!(long.as_bytes(), b"abcd");
    }
}
