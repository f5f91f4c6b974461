//! C-style backend traits operating on thin pointers, with alignment implied by size.
//!
//! C allocators merely accept a pointer for free/realloc/size queries.
//! These traits describe the raw capabilities of a backend; [`Usable`](crate::Usable) strategies build on them.
//!
//! | Trait             | Capability                                    | Required  |
//! | ------------------| ----------------------------------------------| ----------|
//! | [`Alloc`]         | `malloc` / `calloc` (+ optional aligned fn)   | ✔️
//! | [`Free`]          | `free` / sized free                           | ✔️
//! | [`Realloc`]       | `realloc`                                     | ✔️
//! | [`SizeOf`]        | `malloc_usable_size` / `HeapSize` / ...       | Optional: without it, use [`adapt::SizeHeader`](crate::allocator::adapt::SizeHeader)
//! | [`Introspect`]    | statistics, background purging, purge         | Defaults to "not supported"

use crate::*;

use core::mem::MaybeUninit;
use core::num::NonZeroUsize;
#[cfg(doc)] use core::ptr::NonNull;



const ALIGN_USIZE : usize = core::mem::align_of::<usize>();

/// Allocation functions with alignment (up to <code>[Alloc]::[MAX_ALIGN](Self::MAX_ALIGN)</code>) implied by size:
/// <code>
/// fn [alloc_uninit](Self::alloc_uninit)(size: [NonZeroUsize]) -> [Result]&lt;[NonNull]&lt;\_&gt;, \_&gt;
/// fn [alloc_zeroed](Self::alloc_zeroed)(size: [NonZeroUsize]) -> [Result]&lt;[NonNull]&lt;\_&gt;, \_&gt;
/// </code><br>
///
/// Zero sized requests don't compile thanks to [`NonZeroUsize`] - see [`size::clamp_min`](crate::size::clamp_min).
pub unsafe trait Alloc {
    type Error : core::fmt::Debug;

    /// The alignment every allocation of at least this many bytes is guaranteed to have.
    ///
    /// This defaults to a conservative <code>align_of::&lt;[usize]&gt;()</code>.<br>
    /// Real allocators often guarantee <code>align_of::&lt;max_align_t&gt;()</code> (16 on most 64-bit platforms).
    const MAX_ALIGN : usize = ALIGN_USIZE;

    /// Allocate at least `size` bytes of uninitialized memory.
    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN, Self::Error>;

    /// Allocate at least `size` bytes of zeroed memory.
    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> {
        let alloc = self.alloc_uninit(size)?;
        // SAFETY: ✔️ `alloc` was just allocated with at least `size` bytes
        unsafe { core::slice::from_raw_parts_mut(alloc.as_ptr(), size.get()) }.fill(MaybeUninit::new(0u8));
        Ok(alloc.cast())
    }

    /// Allocate at least `size` bytes aligned to `align`, a power of two beyond [`MAX_ALIGN`](Self::MAX_ALIGN).
    ///
    /// The result must be compatible with every other `thin` fn of `self`.
    /// Backends without an aligned allocation fn keep this default, which always fails.
    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<AllocNN, ()> {
        let _ = (size, align);
        Err(())
    }
}



/// Deallocation functions:<br>
/// <code>[free](Self::free)(ptr: [NonNull]<[MaybeUninit]<[u8]>>)</code><br>
/// <code>[free_sized](Self::free_sized)(ptr: [NonNull]<[MaybeUninit]<[u8]>>, size: [usize])</code><br>
/// <br>
pub unsafe trait Free {
    /// Deallocate an allocation, `ptr`, belonging to `self`.
    ///
    /// ### Safety
    /// *   `ptr` must belong to `self`
    /// *   `ptr` will no longer be accessible after free
    unsafe fn free(&self, ptr: AllocNN);

    /// Deallocate an allocation, `ptr`, belonging to `self`, whose size is already known.
    ///
    /// Backends with sized deallocation (e.g. `sdallocx`) can skip their own size lookup.
    ///
    /// ### Safety
    /// *   `ptr` must belong to `self`
    /// *   `size` must be between the size originally requested and the allocation's usable size (inclusive)
    /// *   `ptr` will no longer be accessible after free
    unsafe fn free_sized(&self, ptr: AllocNN, size: usize) {
        let _ = size;
        // SAFETY: ✔️ `ptr` belongs to `self` per the fn's preconditions
        unsafe { self.free(ptr) }
    }
}



/// Reallocation function:<br>
/// <code>[realloc_uninit](Self::realloc_uninit)(ptr: [NonNull]<[MaybeUninit]<[u8]>>, new_size: [NonZeroUsize]) -> [Result]&lt;[NonNull]&lt;\_&gt;, \_&gt;</code><br>
/// <br>
pub unsafe trait Realloc : Alloc + Free {
    /// Reallocate an existing allocation, `ptr`, belonging to `self`.
    ///
    /// On failure, `ptr` remains a valid, unmodified allocation.
    ///
    /// ### Safety
    /// *   `ptr` must belong to `self`
    /// *   `ptr` will no longer be accessible after a succesful realloc (`realloc_uninit` returns <code>[Ok]\(...\)</code>)
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error>;
}



/// Allocation size query (reliable for `self`-owned allocations):<br>
/// <code>[size_of](Self::size_of)(ptr: [NonNull]<[MaybeUninit]<[u8]>>) -> [usize]</code><br>
/// <br>
///
/// ### Safety
/// Callers may read and write all of `ptr[..a.size_of(ptr)]` when `ptr` is a valid allocation owned by `a`,
/// and will hand that size right back to [`Free::free_sized`].
/// By implementing this trait, you pinky promise that such a size is valid, and stable until `ptr` is reallocated or freed.
pub unsafe trait SizeOf : Alloc {
    /// Retrieve the usable size of the allocation `ptr`, owned by `self`.
    ///
    /// ### Safety
    /// *   May exhibit UB if `ptr` is not an allocation belonging to `self`.
    /// *   Returns the allocation size, but some or all of the data in said allocation might be uninitialized.
    unsafe fn size_of(&self, ptr: AllocNN) -> usize;
}



/// Allocator-wide statistics, as reported by [`Introspect::info`].
///
/// All fields are zero when the backend doesn't track them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)] pub struct AllocatorInfo {
    /// Bytes in live allocations, as the backend sees them.
    pub allocated:  usize,
    /// Bytes in pages with live allocations (`>= allocated`).
    pub active:     usize,
    /// Bytes physically resident in pages owned by the backend.
    pub resident:   usize,
    /// Bytes of virtual memory kept mapped but returned to the OS (`MADV_DONTNEED`).
    pub retained:   usize,
    /// Bytes returned lazily (`MADV_FREE`) that still count as resident until reclaimed.
    pub muzzy:      usize,
}

/// Outcome of [`Introspect::purge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)] pub enum Purge {
    /// Unused pages were handed back to the OS.
    Success,
    /// The backend has nothing resembling a purge.
    NotApplicable,
    /// The backend supports purging, but it failed.
    Failed,
}

/// Optional allocator-wide queries and maintenance.
///
/// Every function has a "not supported" default, so most backends need only an empty `impl`.
pub trait Introspect {
    /// Allocator-wide statistics, zero-filled where unsupported.
    fn info(&self) -> AllocatorInfo { AllocatorInfo::default() }

    /// Enable or disable background maintenance threads (e.g. asynchronous purging).
    fn set_background_thread(&self, enable: bool) { let _ = enable; }

    /// Return all unused, reserved pages to the OS.
    fn purge(&self) -> Purge { Purge::NotApplicable }
}



unsafe impl<'a, A: Alloc> Alloc for &'a A {
    type Error = A::Error;
    const MAX_ALIGN : usize = A::MAX_ALIGN;
    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN,  Self::Error> { A::alloc_uninit(self, size) }
    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> { A::alloc_zeroed(self, size) }
    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<AllocNN, ()> { A::alloc_aligned(self, size, align) }
}

unsafe impl<'a, A: Free> Free for &'a A {
    // SAFETY: ✔️ same preconditions as `A`'s impl
    unsafe fn free(      &self, ptr: AllocNN              ) { unsafe { A::free(      self, ptr      ) } }
    // SAFETY: ✔️ same preconditions as `A`'s impl
    unsafe fn free_sized(&self, ptr: AllocNN, size: usize ) { unsafe { A::free_sized(self, ptr, size) } }
}

unsafe impl<'a, A: Realloc> Realloc for &'a A {
    // SAFETY: ✔️ same preconditions as `A`'s impl
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> { unsafe { A::realloc_uninit(self, ptr, new_size) } }
}

unsafe impl<'a, A: SizeOf> SizeOf for &'a A {
    // SAFETY: ✔️ same preconditions as `A`'s impl
    unsafe fn size_of(&self, ptr: AllocNN) -> usize { unsafe { A::size_of(self, ptr) } }
}

impl<'a, A: Introspect> Introspect for &'a A {
    fn info(&self) -> AllocatorInfo { A::info(self) }
    fn set_background_thread(&self, enable: bool) { A::set_background_thread(self, enable) }
    fn purge(&self) -> Purge { A::purge(self) }
}



/// Testing functions to verify implementations of [`thin`] traits.
pub mod test {
    use super::*;
    use std::vec::Vec;

    fn nz(size: usize) -> NonZeroUsize { NonZeroUsize::new(size).expect("test sizes are nonzero") }

    /// Assert that allocations are aligned to at least [`Alloc::MAX_ALIGN`] once they're at least that large.
    #[track_caller] pub fn alignment<A: Alloc + Free>(allocator: A) {
        let mut allocs = Vec::new();
        for size in [A::MAX_ALIGN, A::MAX_ALIGN * 2, 100, 4096, 65536] {
            for _ in 0 .. 16 {
                let alloc = allocator.alloc_uninit(nz(size)).expect("allocation failed");
                assert_eq!(0, alloc.as_ptr() as usize % A::MAX_ALIGN, "{size} byte allocation {alloc:?} isn't aligned to MAX_ALIGN = {}", A::MAX_ALIGN);
                allocs.push(alloc);
            }
        }
        for alloc in allocs { unsafe { allocator.free(alloc) } }
    }

    /// Assert that absurd sizes fail cleanly instead of crashing or returning tiny allocations.
    #[track_caller] pub fn edge_case_sizes<A: Alloc + Free>(allocator: A) {
        for size in [usize::MAX, usize::MAX - 1, usize::MAX / 2, crate::size::TOO_LARGE - 1] {
            if let Ok(alloc) = allocator.alloc_uninit(nz(size)) {
                // unlikely, but not impossible on e.g. overcommitting 64-bit systems for the smaller sizes
                unsafe { allocator.free(alloc) };
            }
        }
    }

    /// Assert that [`SizeOf::size_of`] reports at least as many bytes as were requested, and that all of them are writable.
    #[track_caller] pub fn size_over_alloc<A: SizeOf + Free>(allocator: A) {
        for size in [1, 2, 3, 7, 8, 9, 15, 16, 17, 100, 1000, 4095, 4096, 4097, 100_000] {
            let alloc = allocator.alloc_uninit(nz(size)).expect("allocation failed");
            let usable = unsafe { allocator.size_of(alloc) };
            assert!(usable >= size, "size_of reported {usable} bytes for a {size} byte allocation");
            unsafe { core::slice::from_raw_parts_mut(alloc.as_ptr(), usable) }.fill(MaybeUninit::new(0xCC));
            unsafe { allocator.free_sized(alloc, usable) };
        }
    }

    /// Assert that [`Alloc::alloc_zeroed`] returns zeroed memory.
    #[track_caller] pub fn zeroed_alloc<A: Alloc + Free>(allocator: A) {
        for size in [1, 8, 24, 1000, 4096, 100_000] {
            let alloc = allocator.alloc_zeroed(nz(size)).expect("allocation failed");
            let bytes = unsafe { core::slice::from_raw_parts(alloc.as_ptr(), size) };
            assert!(bytes.iter().all(|b| *b == 0), "{size} byte zeroed allocation had nonzero bytes");
            unsafe { allocator.free(alloc.cast()) };
        }
    }

    /// Assert that [`Realloc::realloc_uninit`] preserves contents when growing and shrinking.
    #[track_caller] pub fn realloc_preserves<A: Realloc>(allocator: A) {
        let alloc = allocator.alloc_uninit(nz(16)).expect("allocation failed");
        for i in 0 .. 16 { unsafe { alloc.as_ptr().add(i).write(MaybeUninit::new(i as u8)) } }
        let alloc = unsafe { allocator.realloc_uninit(alloc, nz(100_000)) }.expect("reallocation failed");
        for i in 0 .. 16 { assert_eq!(i as u8, unsafe { alloc.as_ptr().add(i).read().assume_init() }) }
        let alloc = unsafe { allocator.realloc_uninit(alloc, nz(4)) }.expect("reallocation failed");
        for i in 0 .. 4 { assert_eq!(i as u8, unsafe { alloc.as_ptr().add(i).read().assume_init() }) }
        unsafe { allocator.free(alloc) };
    }
}
