//! # Internal Macros
//!
//! Accessor boilerplate for zerocopy page structs whose fields use the
//! little-endian wrapper types (`U16`, `U32`).
//!
//! One macro branch covers every field width: the getter goes through the
//! wrapper's `get()` and the setter through its `set()`, so only the
//! native type appears at the call site.
//!
//! ```ignore
//! use zerocopy::little_endian::{U16, U32};
//!
//! #[repr(C)]
//! struct NodeHeader {
//!     page_id: U32,
//!     size: U16,
//! }
//!
//! impl NodeHeader {
//!     zerocopy_accessors! {
//!         page_id: u32,
//!         size: u16,
//!     }
//! }
//!
//! // Expands to page_id() / set_page_id() and size() / set_size(),
//! // reading and writing the little-endian fields in place.
//! ```

/// Generates a getter and a `set_`-prefixed setter for each listed
/// little-endian field.
#[macro_export]
macro_rules! zerocopy_accessors {
    ($($field:ident : $native:ty),* $(,)?) => {
        ::paste::paste! {
            $(
                #[inline]
                pub fn $field(&self) -> $native {
                    self.$field.get()
                }

                #[inline]
                pub fn [<set_ $field>](&mut self, val: $native) {
                    self.$field.set(val);
                }
            )*
        }
    };
}
