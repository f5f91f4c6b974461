//! [`GLOBAL`]: the process-wide [`Accountant`], using the best strategy this build has.
//!
//! | Features                  | [`DefaultStrategy`]                       |
//! | --------------------------| ------------------------------------------|
//! | `jemalloc`                | `Native<Jemalloc>`
//! | `win32` (Windows)         | `SizeHeader<ProcessHeap>`
//! | `c`                       | `SizeHeader<Malloc>`
//!
//! Every choice can serve any alignment a Rust `Layout` asks for, which `std` relies on
//! (its channels box 128-byte aligned state).  `HeapAlloc` stops at 16, hence the header over the process heap.
//!
//! Nothing routes through [`GLOBAL`] unless the application asks it to, e.g. with:
//! ```no_run
//! #[global_allocator] static ALLOC : &tallyalloc::global::Global = &tallyalloc::global::GLOBAL;
//! # fn main() {}
//! ```

use crate::*;
#[allow(unused_imports)] use crate::allocator::adapt::{Native, SizeHeader};



#[cfg(feature = "jemalloc")] mod strategy {
    use super::*;
    pub type DefaultStrategy = Native<allocator::jemalloc::Jemalloc>;
    pub(super) const DEFAULT : DefaultStrategy = Native(allocator::jemalloc::Jemalloc);
}

#[cfg(all(not(feature = "jemalloc"), windows, feature = "win32"))] mod strategy {
    use super::*;
    pub type DefaultStrategy = SizeHeader<allocator::win32::ProcessHeap>;
    pub(super) const DEFAULT : DefaultStrategy = SizeHeader(allocator::win32::ProcessHeap);
}

#[cfg(all(not(feature = "jemalloc"), not(all(windows, feature = "win32")), feature = "c"))] mod strategy {
    use super::*;
    pub type DefaultStrategy = SizeHeader<allocator::c::Malloc>;
    pub(super) const DEFAULT : DefaultStrategy = SizeHeader(allocator::c::Malloc);
}

#[cfg(not(any(feature = "jemalloc", all(windows, feature = "win32"), feature = "c")))]
compile_error!("tallyalloc needs at least one backend: enable the `c`, `win32` (Windows), or `jemalloc` feature");

/// The strategy [`GLOBAL`] allocates with.
pub use strategy::DefaultStrategy;

/// The type of [`GLOBAL`].
pub type Global = Accountant<DefaultStrategy>;

/// The process-wide [`Accountant`].
pub static GLOBAL : Global = Accountant::new(strategy::DEFAULT);

/// <code>[GLOBAL].[used_memory](Accountant::used_memory)\(\)</code>
pub fn used_memory() -> usize { GLOBAL.used_memory() }

/// <code>[GLOBAL].[set_oom_handler](Accountant::set_oom_handler)\(handler\)</code>
pub fn set_oom_handler(handler: OomHandler) { GLOBAL.set_oom_handler(handler) }



#[test] fn global() {
    let ptr = GLOBAL.alloc(100);
    assert!(used_memory() >= 100);
    assert!(unsafe { GLOBAL.usable_size(ptr) } >= 100);
    unsafe { GLOBAL.free(Some(ptr)) };

    let ptr = GLOBAL.alloc_aligned(512, 128);
    assert_eq!(0, ptr.as_ptr() as usize % 128);
    unsafe { GLOBAL.free(Some(ptr)) };
    // other tests may be using GLOBAL concurrently, so only the round trip is checked
}
