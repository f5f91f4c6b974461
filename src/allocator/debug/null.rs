#![allow(unused_variables)]

use crate::*;

use core::num::NonZeroUsize;



/// Never allocates anything.
///
/// Behind an [`Accountant`](crate::Accountant), every `try_*` fails and every or-fail call reaches the OOM handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] pub struct Null;

// SAFETY: ✔️ always failing to allocate is a trivally safe implementation of this trait
unsafe impl thin::Alloc for Null {
    type Error = ();
    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<AllocNN,  Self::Error> { Err(()) }
    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<AllocNN0, Self::Error> { Err(()) }
}

// SAFETY: ✔️ this trait cannot be safely called, and simply panicing in response is a reasonable response to the caller's UB
unsafe impl thin::Free for Null {
    #[track_caller] #[inline(never)] unsafe fn free(&self, ptr: AllocNN) {
        // SAFETY: ✔️ violation of thin::Free::free's documented safety precondition that `ptr` belong to `self`
        unsafe { ub!("bug: undefined behavior: {ptr:?} does not belong to `self` as the Null allocator can't allocate anything to free in the first place") }
    }
}

// SAFETY: ✔️ always failing to (re)allocate is a trivally safe implementation of this trait
unsafe impl thin::Realloc for Null {
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<AllocNN, Self::Error> { Err(()) }
}

// SAFETY: ✔️ this trait cannot be safely called, and simply panicing in response is a reasonable response to the caller's UB
unsafe impl thin::SizeOf for Null {
    #[track_caller] #[inline(never)] unsafe fn size_of(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ violation of thin::SizeOf::size_of's documented safety precondition that `ptr` belong to `self`
        unsafe { ub!("bug: undefined behavior: {ptr:?} does not belong to `self` as the Null allocator can't allocate anything to query in the first place") }
    }
}

impl thin::Introspect for Null {}



#[test] fn thin_edge_case_sizes() { thin::test::edge_case_sizes(Null) }

#[test] fn never_allocates() {
    use thin::Alloc;
    for size in [1, 8, 4096] {
        let size = NonZeroUsize::new(size).unwrap();
        assert!(Null.alloc_uninit(size).is_err());
        assert!(Null.alloc_zeroed(size).is_err());
    }
}

#[test] #[should_panic(expected = "Null allocator can't allocate anything")] fn free_is_ub() {
    use thin::Free;
    let mut byte = core::mem::MaybeUninit::new(0u8);
    unsafe { Null.free(core::ptr::NonNull::from(&mut byte)) }
}
