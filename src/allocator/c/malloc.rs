use crate::*;

use libc::*;

use core::num::NonZeroUsize;
use core::ptr::NonNull;



/// `malloc` / `calloc` / `realloc` / `free` from the C standard library.
///
/// Deliberately implements no [`thin::SizeOf`]: `malloc_usable_size` and friends are nonstandard,
/// so pair this with [`adapt::SizeHeader`](crate::allocator::adapt::SizeHeader) to account for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] #[repr(transparent)] pub struct Malloc;



/// | Safety Item   | Description   |
/// | --------------| --------------|
/// | `align`       | ✔️ Validated via [`thin::test::alignment`] ("... suitably aligned so that it may be assigned to a pointer to any type of object" C89 § 7.20.3 ¶ 1)
/// | `size`        | ✔️ Validated via [`thin::test::edge_case_sizes`]
/// | `exclusive`   | ✔️ Allocations are disjoint from any other object (C89 § 7.20.3 ¶ 1)
/// | `threads`     | ⚠️ thread-unsafe stdlibs existed once upon a time.  I consider linking them in a multithreaded program defacto undefined behavior beyond the scope of this to guard against.
/// | `zeroed`      | ✔️ Validated via [`thin::test::zeroed_alloc`], correct use of `calloc` ("The space is initialized to all bits zero" C89 § 7.20.3.1 ¶ 2)
// SAFETY: per above
unsafe impl thin::Alloc for Malloc {
    type Error = ();

    /// | Platform          | Value     |
    /// | ------------------| ----------|
    /// | Windows 32-bit    | `8` according to Microsoft
    /// | Windows 64-bit    | `16` according to Microsoft
    /// | Everything else   | `2 * size_of::<usize>()`, matching glibc, musl, and the BSDs
    ///
    /// Many systems allow the developer to customize their implementation of `malloc`.
    /// Such custom implementations *could* provide less alignment than this.
    /// I consider such a thing to be a bug *by the customizer*, likely to break a lot more than the code relying on this `MAX_ALIGN`.
    const MAX_ALIGN : usize = if cfg!(target_env = "msvc") {
        if core::mem::size_of::<usize>() >= 8 { 16 } else { 8 }
    } else {
        2 * core::mem::size_of::<usize>()
    };

    #[track_caller] fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ this "should" be safe for all `size`.  Unsound C stdlibs are #[test]ed for at the end of this file.
        let alloc = unsafe { malloc(size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }

    #[track_caller] fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> {
        // SAFETY: ✔️ this "should" be safe for all `size`.  Unsound C stdlibs are #[test]ed for at the end of this file.
        // SAFETY: ✔️ `calloc` zeros memory
        let alloc = unsafe { calloc(1, size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

// SAFETY: ✔️ `free` is compatible with `malloc` / `realloc` / `calloc` (C89 § 7.20.3.2 ¶ 2) and returns no errors
unsafe impl thin::Free for Malloc {
    #[track_caller] unsafe fn free(&self, ptr: AllocNN) {
        // SAFETY: ✔️ `ptr` belongs to `self` per [`thin::Free::free`]'s documented safety preconditions
        unsafe { free(ptr.as_ptr().cast()) }
    }
}

/// | Safety Item   | Description   |
/// | --------------| --------------|
/// | `compatible`  | ✔️ `realloc` accepts anything `malloc` / `calloc` / `realloc` returned
/// | `failure`     | ✔️ `realloc` returns null and leaves the old allocation untouched on error (C89 § 7.20.3.4 ¶ 4)
/// | `preserved`   | ✔️ Validated via [`thin::test::realloc_preserves`]
// SAFETY: per above
unsafe impl thin::Realloc for Malloc {
    #[track_caller] unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        // SAFETY: ✔️ `ptr` belongs to `self` per thin::Realloc's documented safety preconditions, and thus was allocated with one of `malloc`, `calloc`, or `realloc`
        let alloc = unsafe { realloc(ptr.as_ptr().cast(), new_size.get()) };
        NonNull::new(alloc.cast()).ok_or(())
    }
}

impl thin::Introspect for Malloc {
    /// `malloc_trim(0)` on glibc, [`thin::Purge::NotApplicable`] elsewhere.
    ///
    /// `malloc_trim` reports `1` if memory was released, `0` if there was nothing to release - neither is a failure.
    fn purge(&self) -> thin::Purge {
        #[cfg(all(target_os = "linux", target_env = "gnu"))] {
            // SAFETY: ✔️ `malloc_trim` takes the allocator's own locks, and any `pad` is valid
            let _released = unsafe { malloc_trim(0) };
            thin::Purge::Success
        }
        #[cfg(not(all(target_os = "linux", target_env = "gnu")))] {
            thin::Purge::NotApplicable
        }
    }
}



#[test] fn thin_alignment()         { thin::test::alignment(Malloc) }
#[test] fn thin_edge_case_sizes()   { thin::test::edge_case_sizes(Malloc) }
#[test] fn thin_zeroed()            { thin::test::zeroed_alloc(Malloc) }
#[test] fn thin_realloc()           { thin::test::realloc_preserves(Malloc) }
#[test] fn thin_by_ref()            { thin::test::realloc_preserves(&Malloc) }

#[test] fn purge() {
    use thin::Introspect;
    let expected = if cfg!(all(target_os = "linux", target_env = "gnu")) { thin::Purge::Success } else { thin::Purge::NotApplicable };
    assert_eq!(expected, Malloc.purge());
    assert_eq!(thin::AllocatorInfo::default(), Malloc.info());
}
