use crate::*;
use crate::usable::*;

use core::num::NonZeroUsize;



/// Use a backend's own size query ([`thin::SizeOf`]) for usable sizes.
///
/// Usable size and accounted size are the same number: whatever the backend says it handed out,
/// which may exceed the request thanks to size-class rounding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] #[repr(transparent)] pub struct Native<A>(pub A);

impl<A> core::ops::Deref for Native<A> { fn deref(&self) -> &Self::Target { &self.0 } type Target = A; }

impl<A> Native<A> {
    pub const fn new(backend: A) -> Self { Self(backend) }
}

forward_introspect!(Native<A>);

// SAFETY: ✔️ every pointer is straight from `A`, sized by `A::size_of`, which is stable per `thin::SizeOf`'s contract
unsafe impl<A: thin::SizeOf + thin::Realloc + thin::Introspect> Usable for Native<A> {
    const MAX_ALIGN : usize = A::MAX_ALIGN;

    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<Block, ()> {
        let ptr = self.0.alloc_uninit(size).map_err(|_| ())?;
        // SAFETY: ✔️ `ptr` was just allocated by `self.0`
        let usable = unsafe { self.0.size_of(ptr) };
        Ok(Block { ptr, usable, footprint: usable })
    }

    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<Block<AllocNN0>, ()> {
        let ptr = self.0.alloc_zeroed(size).map_err(|_| ())?;
        // SAFETY: ✔️ `ptr` was just allocated by `self.0`
        let usable = unsafe { self.0.size_of(ptr.cast()) };
        Ok(Block { ptr, usable, footprint: usable })
    }

    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<Block, ()> {
        let ptr = self.0.alloc_aligned(size, align)?;
        debug_assert_eq!(0, ptr.as_ptr() as usize % align, "bug: backend returned a misaligned allocation");
        // SAFETY: ✔️ `ptr` was just allocated by `self.0`
        let usable = unsafe { self.0.size_of(ptr) };
        Ok(Block { ptr, usable, footprint: usable })
    }

    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<Resized, ()> {
        // SAFETY: ✔️ `ptr` is live and belongs to `self.0` per `Usable::realloc_uninit`'s documented safety preconditions
        let old_footprint = unsafe { self.0.size_of(ptr) };
        // SAFETY: ✔️ as above
        let ptr = unsafe { self.0.realloc_uninit(ptr, new_size) }.map_err(|_| ())?;
        // SAFETY: ✔️ `ptr` was just (re)allocated by `self.0`
        let usable = unsafe { self.0.size_of(ptr) };
        Ok(Resized { block: Block { ptr, usable, footprint: usable }, old_footprint })
    }

    unsafe fn free(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self.0` per `Usable::free`'s documented safety preconditions
        let size = unsafe { self.0.size_of(ptr) };
        // SAFETY: ✔️ `size` is exactly the usable size the backend reported
        unsafe { self.0.free_sized(ptr, size) };
        size
    }

    unsafe fn free_with_size(&self, ptr: AllocNN, usable: usize) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self.0` per `Usable::free_with_size`'s documented safety preconditions
        debug_assert_eq!(usable, unsafe { self.0.size_of(ptr) }, "bug: undefined behavior: free_with_size was passed the wrong usable size");
        // SAFETY: ✔️ `usable` is the backend's usable size per `Usable::free_with_size`'s documented safety preconditions
        unsafe { self.0.free_sized(ptr, usable) };
        usable
    }

    // SAFETY: ✔️ `ptr` is live and belongs to `self.0` per the fns' documented safety preconditions
    unsafe fn usable_size(&self, ptr: AllocNN) -> usize { unsafe { self.0.size_of(ptr) } }
    // SAFETY: ✔️ as above
    unsafe fn footprint  (&self, ptr: AllocNN) -> usize { unsafe { self.0.size_of(ptr) } }
}



#[cfg(all(windows, feature = "win32"))] #[test] fn process_heap() { usable_roundtrip(Native(crate::allocator::win32::ProcessHeap)) }
#[cfg(feature = "jemalloc")]            #[test] fn jemalloc()     { usable_roundtrip(Native(crate::allocator::jemalloc::Jemalloc)) }

#[cfg(feature = "jemalloc")] #[test] fn jemalloc_aligned() {
    let strategy = Native(crate::allocator::jemalloc::Jemalloc);
    let block = strategy.alloc_aligned(NonZeroUsize::new(300).unwrap(), 512).unwrap();
    assert_eq!(0, block.ptr.as_ptr() as usize % 512);
    assert_eq!(block.footprint, unsafe { strategy.footprint(block.ptr) });
    assert_eq!(block.footprint, unsafe { strategy.free(block.ptr) });
}

#[cfg(all(windows, feature = "win32"))] #[test] fn process_heap_cant_over_align() {
    assert!(Native(crate::allocator::win32::ProcessHeap).alloc_aligned(NonZeroUsize::new(64).unwrap(), 64).is_err());
}

#[cfg(test)] #[allow(dead_code)] fn usable_roundtrip<S: Usable>(strategy: S) {
    let size = NonZeroUsize::new(13).unwrap();
    let block = strategy.alloc_uninit(size).unwrap();
    assert!(block.usable >= 13);
    assert_eq!(block.usable, block.footprint);
    assert_eq!(block.usable, unsafe { strategy.usable_size(block.ptr) });

    let resized = unsafe { strategy.realloc_uninit(block.ptr, NonZeroUsize::new(5000).unwrap()) }.unwrap();
    assert_eq!(resized.old_footprint, block.footprint);
    assert!(resized.block.usable >= 5000);

    assert_eq!(unsafe { strategy.free(resized.block.ptr) }, resized.block.footprint);
}
