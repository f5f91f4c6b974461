#![cfg(feature = "c")]
//! [`Malloc`]
//!
//! | Rust                                  | C                     |
//! | --------------------------------------| ----------------------|
//! | [`thin::Alloc::alloc_uninit`]         | `malloc`              |
//! | [`thin::Alloc::alloc_zeroed`]         | `calloc`              |
//! | [`thin::Realloc::realloc_uninit`]     | `realloc`             |
//! | [`thin::Free::free`]                  | `free`                |
//! | [`thin::SizeOf::size_of`]             | ❌ (use [`adapt::SizeHeader`](crate::allocator::adapt::SizeHeader))
//! | [`thin::Introspect::purge`]           | `malloc_trim(0)` (glibc only)

#[cfg(doc)] use crate::*;

mod malloc;         pub use malloc::Malloc;
