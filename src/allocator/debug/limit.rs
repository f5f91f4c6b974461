use crate::*;

use core::num::NonZeroUsize;



/// Forward to `A`, but refuse any single (re)allocation of more than `max` bytes.
///
/// Lets tests provoke allocation failure at a chosen size without exhausting the machine.
/// Frees, size queries and statistics pass straight through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] pub struct Limit<A> {
    pub backend:    A,
    pub max:        usize,
}

impl<A> Limit<A> {
    pub const fn new(backend: A, max: usize) -> Self { Self { backend, max } }

    fn check(&self, size: NonZeroUsize) -> Result<(), ()> {
        if size.get() > self.max { Err(()) } else { Ok(()) }
    }
}

// SAFETY: ✔️ every successful allocation is straight from `A`
unsafe impl<A: thin::Alloc> thin::Alloc for Limit<A> {
    type Error = ();
    const MAX_ALIGN : usize = A::MAX_ALIGN;

    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        self.check(size)?;
        self.backend.alloc_uninit(size).map_err(|_| ())
    }

    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> {
        self.check(size)?;
        self.backend.alloc_zeroed(size).map_err(|_| ())
    }

    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<AllocNN, ()> {
        self.check(size)?;
        self.backend.alloc_aligned(size, align)
    }
}

// SAFETY: ✔️ every allocation belongs to `A`
unsafe impl<A: thin::Free> thin::Free for Limit<A> {
    // SAFETY: ✔️ every allocation belongs to `self.backend`, same preconditions
    unsafe fn free      (&self, ptr: AllocNN              ) { unsafe { self.backend.free(ptr) } }
    // SAFETY: ✔️ every allocation belongs to `self.backend`, same preconditions
    unsafe fn free_sized(&self, ptr: AllocNN, size: usize ) { unsafe { self.backend.free_sized(ptr, size) } }
}

// SAFETY: ✔️ refusing leaves `ptr` untouched, which is what `thin::Realloc` requires of failure
unsafe impl<A: thin::Realloc> thin::Realloc for Limit<A> {
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> {
        self.check(new_size)?;
        // SAFETY: ✔️ `ptr` belongs to `self.backend` per thin::Realloc's documented safety preconditions
        unsafe { self.backend.realloc_uninit(ptr, new_size) }.map_err(|_| ())
    }
}

// SAFETY: ✔️ sizes are `A`'s own
unsafe impl<A: thin::SizeOf> thin::SizeOf for Limit<A> {
    // SAFETY: ✔️ every allocation belongs to `self.backend`, same preconditions
    unsafe fn size_of(&self, ptr: AllocNN) -> usize { unsafe { self.backend.size_of(ptr) } }
}

impl<A: thin::Introspect> thin::Introspect for Limit<A> {
    fn info(&self) -> thin::AllocatorInfo { self.backend.info() }
    fn set_background_thread(&self, enable: bool) { self.backend.set_background_thread(enable) }
    fn purge(&self) -> thin::Purge { self.backend.purge() }
}



#[cfg(feature = "c")] #[test] fn thin_realloc() { thin::test::realloc_preserves(Limit::new(crate::allocator::c::Malloc, 1 << 20)) }

#[cfg(feature = "c")] #[test] fn refuses_over_limit() {
    use thin::{Alloc, Free, Realloc};
    let limit = Limit::new(crate::allocator::c::Malloc, 64);
    let nz = |n| NonZeroUsize::new(n).unwrap();

    assert!(limit.alloc_uninit(nz(65)).is_err());
    assert!(limit.alloc_zeroed(nz(65)).is_err());

    let ptr = limit.alloc_uninit(nz(64)).unwrap();
    assert!(unsafe { limit.realloc_uninit(ptr, nz(65)) }.is_err());
    let ptr = unsafe { limit.realloc_uninit(ptr, nz(32)) }.unwrap();
    unsafe { limit.free(ptr) };
}
