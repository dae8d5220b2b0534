//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in strata.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (U16, U64, I64).
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::{I64, U64};
//!
//! #[repr(C)]
//! struct Record {
//!     page_count: U64,
//!     page_0_offset: I64,
//! }
//!
//! impl Record {
//!     zerocopy_accessors! {
//!         page_count: u64,
//!         page_0_offset: i64,
//!     }
//! }
//!
//! // Generates:
//! // pub fn page_count(&self) -> u64 { self.page_count.get() }
//! // pub fn set_page_count(&mut self, val: u64) { self.page_count = U64::new(val); }
//! // pub fn page_0_offset(&self) -> i64 { self.page_0_offset.get() }
//! // pub fn set_page_0_offset(&mut self, val: i64) { self.page_0_offset = I64::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u16) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u16 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u16) {
                self.$field = ::zerocopy::little_endian::U16::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::little_endian::U64::new(val);
            }
        }
    };
    (@impl $field:ident, i64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> i64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: i64) {
                self.$field = ::zerocopy::little_endian::I64::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
