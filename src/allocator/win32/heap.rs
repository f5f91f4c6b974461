use crate::*;

use winapi::um::heapapi::{HeapAlloc, HeapCompact, HeapReAlloc, HeapFree, HeapSize, GetProcessHeap};
use winapi::um::winnt::{HANDLE, HEAP_ZERO_MEMORY};

use core::num::NonZeroUsize;
use core::ptr::NonNull;



/// [`HeapAlloc`] / [`HeapReAlloc`] / [`HeapFree`] / [`HeapSize`] on <code>[GetProcessHeap]\(\)</code>
///
/// Reports its own usable sizes, so it can be accounted with [`adapt::Native`](crate::allocator::adapt::Native).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] #[repr(transparent)] pub struct ProcessHeap;

impl ProcessHeap {
    fn handle() -> HANDLE {
        // SAFETY: ⚠️ I assert that undefined behavior must've already happened if things have gone so catastrophically wrong as for this to fail.
        // SAFETY: ⚠️ `GetProcessHeap()` is valid for the lifetime of the process, as any code closing it presumably invokes undefined behavior by third party injected DLLs.
        unsafe { GetProcessHeap() }
    }
}

// SAFETY: ✔️ all thin::* impls intercompatible with each other
unsafe impl thin::Alloc for ProcessHeap {
    type Error = ();

    /// The alignment of memory returned by `HeapAlloc` is `MEMORY_ALLOCATION_ALIGNMENT` in WinNT.h:
    /// ```cpp
    /// #if defined(_WIN64) || defined(_M_ALPHA)
    /// #define MEMORY_ALLOCATION_ALIGNMENT 16
    /// #else
    /// #define MEMORY_ALLOCATION_ALIGNMENT 8
    /// #endif
    /// ```
    ///
    /// <https://learn.microsoft.com/en-us/windows/win32/api/heapapi/nf-heapapi-heapalloc#remarks>
    const MAX_ALIGN : usize = super::MEMORY_ALLOCATION_ALIGNMENT; // Verified through testing

    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        // SAFETY: ✔️ this "should" be safe for all `size`.  Unsoundness is #[test]ed for at the end of this file.
        let alloc = unsafe { HeapAlloc(Self::handle(), 0, size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }

    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> {
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        // SAFETY: ✔️ this "should" be safe for all `size`.  Unsoundness is #[test]ed for at the end of this file.
        // SAFETY: ✔️ HeapAlloc zeros memory when we use HEAP_ZERO_MEMORY
        let alloc = unsafe { HeapAlloc(Self::handle(), HEAP_ZERO_MEMORY, size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

// SAFETY: ✔️ all thin::* impls intercompatible with each other
unsafe impl thin::Realloc for ProcessHeap {
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::Realloc's documented safety preconditions, and thus was allocated with `Heap{,Re}Alloc`
        let alloc = unsafe { HeapReAlloc(Self::handle(), 0, ptr.as_ptr().cast(), new_size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

// SAFETY: ✔️ all thin::* impls intercompatible with each other
unsafe impl thin::Free for ProcessHeap {
    unsafe fn free(&self, ptr: AllocNN) {
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::Free::free's documented safety preconditions - and thus was allocated with `Heap{,Re}Alloc`
        if unsafe { HeapFree(Self::handle(), 0, ptr.as_ptr().cast()) } == 0 && cfg!(debug_assertions) { bug::ub::free_failed(ptr) }
    }
}

// SAFETY: ✔️ all thin::* impls intercompatible with each other
unsafe impl thin::SizeOf for ProcessHeap {
    unsafe fn size_of(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::SizeOf's documented safety preconditions, and thus was allocated with `Heap{,Re}Alloc`
        let size = unsafe { HeapSize(Self::handle(), 0, ptr.as_ptr().cast()) };
        if size == !0 { bug::ub::invalid_ptr_for_allocator(ptr) }
        size
    }
}

impl thin::Introspect for ProcessHeap {
    /// Coalesce free blocks and decommit large free ones.
    fn purge(&self) -> thin::Purge {
        super::clear_last_error();
        // SAFETY: ✔️ thread safe - we don't use HEAP_NO_SERIALIZE
        let largest_free = unsafe { HeapCompact(Self::handle(), 0) };
        let err = if largest_free == 0 { super::get_last_error() } else { 0 };
        if err != 0 {
            log::warn!("HeapCompact failed: error {err}");
            thin::Purge::Failed
        } else {
            thin::Purge::Success
        }
    }
}



#[test] fn thin_alignment()         { thin::test::alignment(ProcessHeap) }
#[test] fn thin_edge_case_sizes()   { thin::test::edge_case_sizes(ProcessHeap) }
#[test] fn thin_realloc()           { thin::test::realloc_preserves(ProcessHeap) }
#[test] fn thin_size()              { thin::test::size_over_alloc(ProcessHeap) }
#[test] fn thin_zeroed()            { thin::test::zeroed_alloc(ProcessHeap) }
#[test] fn purge()                  { assert_eq!(thin::Purge::Success, thin::Introspect::purge(&ProcessHeap)) }
