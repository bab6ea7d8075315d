//! # Configuration Module
//!
//! Centralizes the constants that define page layout and pool sizing.
//! Interdependent values live next to each other and are checked by
//! compile-time assertions so a change in one cannot silently invalidate
//! another.

pub mod constants;
pub use constants::*;
