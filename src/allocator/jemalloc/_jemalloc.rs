#![cfg(feature = "jemalloc")]
//! [`Jemalloc`]
//!
//! | Rust                                  | jemalloc                  |
//! | --------------------------------------| --------------------------|
//! | [`thin::Alloc::alloc_uninit`]         | `malloc`                  |
//! | [`thin::Alloc::alloc_zeroed`]         | `calloc`                  |
//! | [`thin::Alloc::alloc_aligned`]        | `mallocx(MALLOCX_ALIGN)`  |
//! | [`thin::Realloc::realloc_uninit`]     | `realloc`                 |
//! | [`thin::Free::free`]                  | `free`                    |
//! | [`thin::Free::free_sized`]            | `sdallocx`                |
//! | [`thin::SizeOf::size_of`]             | `malloc_usable_size`      |
//! | [`thin::Introspect::info`]            | `stats.*` after an `epoch` refresh
//! | [`thin::Introspect::set_background_thread`] | `background_thread`
//! | [`thin::Introspect::purge`]           | `arena.<narenas>.purge`   |

use crate::*;

use tikv_jemalloc_ctl as ctl;
use tikv_jemalloc_sys as sys;

use core::num::NonZeroUsize;
use core::ptr::NonNull;



/// The bundled jemalloc, via its (prefixed) C API and `mallctl` namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] #[repr(transparent)] pub struct Jemalloc;

// SAFETY: ✔️ all thin::* impls use the same jemalloc instance
unsafe impl thin::Alloc for Jemalloc {
    type Error = ();

    /// jemalloc's smallest size class quantum is 16 bytes on every 64-bit target it supports.
    const MAX_ALIGN : usize = 2 * core::mem::size_of::<usize>();

    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ any `size` is valid, failure is reported as null
        let alloc = unsafe { sys::malloc(size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }

    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> {
        // SAFETY: ✔️ any `size` is valid, failure is reported as null
        // SAFETY: ✔️ `calloc` zeros memory
        let alloc = unsafe { sys::calloc(1, size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }

    /// `malloc_usable_size`, `realloc`, `free` and `sdallocx(.., 0)` all accept the result:
    /// its usable size is an aligned size class, which needs no flags to look up again.
    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<AllocNN, ()> {
        if !align.is_power_of_two() { return Err(()) }
        // SAFETY: ✔️ `size` is nonzero and `align` a power of two, as `mallocx` requires
        let alloc = unsafe { sys::mallocx(size.get(), sys::MALLOCX_ALIGN(align)) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

// SAFETY: ✔️ all thin::* impls use the same jemalloc instance
unsafe impl thin::Free for Jemalloc {
    unsafe fn free(&self, ptr: AllocNN) {
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::Free::free's documented safety preconditions
        unsafe { sys::free(ptr.as_ptr().cast()) }
    }

    unsafe fn free_sized(&self, ptr: AllocNN, size: usize) {
        // SAFETY: ✔️ `ptr` belongs to `self`, and `size` lies between the request and `malloc_usable_size`, per thin::Free::free_sized's documented safety preconditions
        unsafe { sys::sdallocx(ptr.as_ptr().cast(), size, 0) }
    }
}

// SAFETY: ✔️ all thin::* impls use the same jemalloc instance
unsafe impl thin::Realloc for Jemalloc {
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::Realloc's documented safety preconditions
        let alloc = unsafe { sys::realloc(ptr.as_ptr().cast(), new_size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

// SAFETY: ✔️ `malloc_usable_size` reports the size class, all of which is writable, and `sdallocx` accepts it
unsafe impl thin::SizeOf for Jemalloc {
    unsafe fn size_of(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::SizeOf's documented safety preconditions
        unsafe { sys::malloc_usable_size(ptr.as_ptr().cast_const().cast()) }
    }
}

/// `stats.arenas.<MALLCTL_ARENAS_ALL>.*` addresses the merged statistics of every arena.
const MALLCTL_ARENAS_ALL : usize = 4096;

impl thin::Introspect for Jemalloc {
    fn info(&self) -> thin::AllocatorInfo {
        // statistics are cached until the epoch advances
        if let Err(err) = ctl::epoch::advance() {
            log::warn!("jemalloc: refreshing statistics failed: {err}");
            return thin::AllocatorInfo::default();
        }

        let read = |name: &str, r: ctl::Result<usize>| r.unwrap_or_else(|err| { log::warn!("jemalloc: reading {name} failed: {err}"); 0 });
        let allocated   = read("stats.allocated",   ctl::stats::allocated::read());
        let active      = read("stats.active",      ctl::stats::active::read());
        let resident    = read("stats.resident",    ctl::stats::resident::read());
        let retained    = read("stats.retained",    ctl::stats::retained::read());
        let pmuzzy      = read("stats.arenas.<all>.pmuzzy", muzzy_pages());
        let page        = read("arenas.page",       ctl::arenas::page::read());

        thin::AllocatorInfo { allocated, active, resident, retained, muzzy: pmuzzy.saturating_mul(page) }
    }

    fn set_background_thread(&self, enable: bool) {
        match ctl::background_thread::write(enable) {
            Ok(()) => log::debug!("jemalloc: background_thread = {enable}"),
            Err(err) => log::warn!("jemalloc: setting background_thread = {enable} failed: {err}"),
        }
    }

    fn purge(&self) -> thin::Purge {
        let narenas = match ctl::arenas::narenas::read() {
            Ok(n) => n,
            Err(err) => { log::warn!("jemalloc: reading arenas.narenas failed: {err}"); return thin::Purge::Failed }
        };

        // `arena.<narenas>.purge` purges every arena
        let name = std::format!("arena.{narenas}.purge\0");
        // SAFETY: ✔️ `name` is nul terminated, and `purge` neither reads nor writes a value
        let err = unsafe { sys::mallctl(name.as_ptr().cast(), core::ptr::null_mut(), core::ptr::null_mut(), core::ptr::null_mut(), 0) };
        if err == 0 {
            thin::Purge::Success
        } else {
            log::warn!("jemalloc: {} failed: error {err}", name.trim_end_matches('\0'));
            thin::Purge::Failed
        }
    }
}

fn muzzy_pages() -> ctl::Result<usize> {
    let name = std::format!("stats.arenas.{MALLCTL_ARENAS_ALL}.pmuzzy\0");
    // SAFETY: ✔️ `name` is nul terminated, and `pmuzzy` is a `size_t`
    unsafe { ctl::raw::read::<usize>(name.as_bytes()) }
}



#[test] fn thin_alignment()         { thin::test::alignment(Jemalloc) }
#[test] fn thin_edge_case_sizes()   { thin::test::edge_case_sizes(Jemalloc) }
#[test] fn thin_realloc()           { thin::test::realloc_preserves(Jemalloc) }
#[test] fn thin_size()              { thin::test::size_over_alloc(Jemalloc) }
#[test] fn thin_zeroed()            { thin::test::zeroed_alloc(Jemalloc) }

#[test] fn aligned() {
    use thin::{Alloc, Free, SizeOf};
    for align in [32, 256, 4096, 1 << 16] {
        let ptr = Jemalloc.alloc_aligned(NonZeroUsize::new(100).unwrap(), align).unwrap();
        assert_eq!(0, ptr.as_ptr() as usize % align);
        let usable = unsafe { Jemalloc.size_of(ptr) };
        assert!(usable >= 100);
        unsafe { Jemalloc.free_sized(ptr, usable) };
    }
    assert!(Jemalloc.alloc_aligned(NonZeroUsize::new(8).unwrap(), 48).is_err());
}

#[test] fn introspect() {
    use thin::{Alloc, Free, Introspect};
    let ptr = Jemalloc.alloc_uninit(NonZeroUsize::new(1 << 20).unwrap()).unwrap();
    let info = Jemalloc.info();
    assert!(info.allocated >= 1 << 20, "{info:?}");
    assert!(info.active >= info.allocated, "{info:?}");
    assert!(info.resident >= info.active, "{info:?}");
    unsafe { Jemalloc.free(ptr) };
    assert_eq!(thin::Purge::Success, Jemalloc.purge());
}
