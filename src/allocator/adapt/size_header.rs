use crate::*;
use crate::usable::*;

use core::mem::size_of;
use core::num::NonZeroUsize;
use core::ptr::NonNull;



/// Prefix every allocation with a hidden header recording its (clamped) requested size.
///
/// For backends that can't report the size of an allocation (no [`thin::SizeOf`]),
/// and for alignments the backend can't provide.
///
/// ```text
///  raw (backend pointer)                      ptr (caller pointer)
///  |                                          |
///  v                                          v
///  [ padding ... | align: usize | size: usize ][ size bytes ...                   ]
///  <---------------- HEADER ------------------>
///
///  over-aligned (align > MAX_ALIGN), with a block of `size + HEADER + WORD + align` bytes:
///  [ padding ... | offset: usize | align: usize | size: usize ][ size bytes ... ][ slack ]
///  <----------------------- offset --------------------------->
/// ```
///
/// | Query                     | Result                                                |
/// | --------------------------| ------------------------------------------------------|
/// | usable size               | `size`
/// | accounted footprint       | `size + HEADER`, or `size + HEADER + WORD + align` when over-aligned
///
/// The header is written on allocation, rewritten on reallocation, and read on free.
/// Nothing outside this type knows it exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] #[repr(transparent)] pub struct SizeHeader<A>(pub A);

impl<A> core::ops::Deref for SizeHeader<A> { fn deref(&self) -> &Self::Target { &self.0 } type Target = A; }

impl<A> SizeHeader<A> {
    pub const fn new(backend: A) -> Self { Self(backend) }
}

const WORD : usize = size_of::<usize>();

/// The header words of a live allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)] struct Header {
    size:   usize,
    /// `0` unless over-aligned.
    align:  usize,
}

impl<A: thin::Alloc> SizeHeader<A> {
    /// Width of the hidden prefix: wide enough for two [`usize`]s, and a multiple of the backend's alignment so callers keep it.
    pub const HEADER : usize = if A::MAX_ALIGN > 2 * WORD { A::MAX_ALIGN } else { 2 * WORD };

    fn plain_size(size: NonZeroUsize) -> Result<NonZeroUsize, ()> {
        // size::too_large has already refused anything near overflowing here
        size.checked_add(Self::HEADER).ok_or(())
    }

    fn aligned_size(size: NonZeroUsize, align: usize) -> Result<NonZeroUsize, ()> {
        size.checked_add(Self::HEADER + WORD).and_then(|s| s.checked_add(align)).ok_or(())
    }

    fn footprint_of(header: Header) -> usize {
        if header.align == 0 { header.size + Self::HEADER } else { header.size + Self::HEADER + WORD + header.align }
    }

    /// ### Safety
    /// *   `ptr` must have at least `n * WORD` writable bytes before it, within the same allocation
    unsafe fn word(ptr: NonNull<u8>, n: usize) -> *mut usize {
        // SAFETY: ✔️ in bounds per the fn's preconditions
        unsafe { ptr.cast::<usize>().as_ptr().byte_sub(n * WORD) }
    }

    /// ### Safety
    /// *   `raw` must be a backend allocation of at least `size + HEADER` bytes
    unsafe fn stamp(raw: NonNull<u8>, size: usize) -> Block<AllocNN0> {
        // SAFETY: ✔️ `raw` is valid for `size + HEADER` bytes per the fn's preconditions
        let ptr = unsafe { raw.add(Self::HEADER) };
        // SAFETY: ✔️ both words sit in the last `2 * WORD` bytes of `raw[..HEADER]`
        unsafe {
            Self::word(ptr, 1).write_unaligned(size);
            Self::word(ptr, 2).write_unaligned(0);
        }
        Block { ptr, usable: size, footprint: size + Self::HEADER }
    }

    /// ### Safety
    /// *   `raw` must be a backend allocation of at least <code>[aligned_size](Self::aligned_size)\(size, align\)</code> bytes
    /// *   `align` must be a power of two
    unsafe fn stamp_aligned(raw: NonNull<u8>, size: usize, align: usize) -> Block<AllocNN0> {
        let addr = raw.as_ptr() as usize;
        let prefix = Self::HEADER + WORD;
        // at most `prefix + align - 1`, leaving `size` bytes within `aligned_size`
        let offset = ((addr + prefix + align - 1) & !(align - 1)) - addr;
        // SAFETY: ✔️ `offset + size` is within the `size + prefix + align` bytes of `raw`
        let ptr = unsafe { raw.add(offset) };
        // SAFETY: ✔️ `offset >= prefix = HEADER + WORD >= 3 * WORD`, so all three words lie within `raw`
        unsafe {
            Self::word(ptr, 1).write_unaligned(size);
            Self::word(ptr, 2).write_unaligned(align);
            Self::word(ptr, 3).write_unaligned(offset);
        }
        Block { ptr, usable: size, footprint: size + prefix + align }
    }

    fn uninit(block: Block<AllocNN0>) -> Block {
        Block { ptr: block.ptr.cast(), usable: block.usable, footprint: block.footprint }
    }

    /// ### Safety
    /// *   `ptr` must be a live caller-visible pointer produced by `self`
    unsafe fn read(ptr: AllocNN) -> Header {
        // SAFETY: ✔️ written by `stamp` or `stamp_aligned` immediately before `ptr`
        let (size, align) = unsafe { (Self::word(ptr.cast(), 1).read_unaligned(), Self::word(ptr.cast(), 2).read_unaligned()) };
        if cfg!(debug_assertions) && (size::too_large(size) || (align != 0 && !align.is_power_of_two())) {
            bug::ub::corrupt_size_header(ptr, size)
        }
        Header { size, align }
    }

    /// ### Safety
    /// *   `ptr` must be a live caller-visible pointer produced by `self`, with `header` read from it
    unsafe fn raw(ptr: AllocNN, header: Header) -> AllocNN {
        let offset = if header.align == 0 {
            Self::HEADER
        } else {
            // SAFETY: ✔️ over-aligned allocations have their offset in the third word by `stamp_aligned`
            unsafe { Self::word(ptr.cast(), 3).read_unaligned() }
        };
        // SAFETY: ✔️ every caller-visible pointer is exactly `offset` bytes into a backend allocation
        unsafe { ptr.byte_sub(offset) }
    }
}

forward_introspect!(SizeHeader<A>);

// SAFETY: ✔️ every caller pointer is a multiple of `A::MAX_ALIGN` (or `align`) bytes into a backend allocation with room for `size`,
//            and the footprint is derived from the header that `stamp` or `stamp_aligned` wrote alongside it
unsafe impl<A: thin::Realloc + thin::Introspect> Usable for SizeHeader<A> {
    const MAX_ALIGN : usize = A::MAX_ALIGN;

    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<Block, ()> {
        let raw = self.0.alloc_uninit(Self::plain_size(size)?).map_err(|_| ())?;
        // SAFETY: ✔️ `raw` was just allocated with `size + HEADER` bytes
        Ok(Self::uninit(unsafe { Self::stamp(raw.cast(), size.get()) }))
    }

    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<Block<AllocNN0>, ()> {
        let raw = self.0.alloc_zeroed(Self::plain_size(size)?).map_err(|_| ())?;
        // SAFETY: ✔️ `raw` was just allocated with `size + HEADER` bytes
        Ok(unsafe { Self::stamp(raw, size.get()) })
    }

    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<Block, ()> {
        if !align.is_power_of_two() { return Err(()) }
        if align <= A::MAX_ALIGN { return self.alloc_uninit(size) }
        let raw = self.0.alloc_uninit(Self::aligned_size(size, align)?).map_err(|_| ())?;
        // SAFETY: ✔️ `raw` was just allocated with `aligned_size(size, align)` bytes, and `align` is a power of two
        Ok(Self::uninit(unsafe { Self::stamp_aligned(raw.cast(), size.get(), align) }))
    }

    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<Resized, ()> {
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per `Usable::realloc_uninit`'s documented safety preconditions
        let header = unsafe { Self::read(ptr) };
        let old_footprint = Self::footprint_of(header);

        if header.align != 0 {
            // the backend would move `raw`, not `ptr`, so over-aligned blocks are copied into plain ones
            let block = self.alloc_uninit(new_size)?;
            // SAFETY: ✔️ both are live, distinct, and valid for at least the smaller of their sizes
            unsafe { block.ptr.as_ptr().copy_from_nonoverlapping(ptr.as_ptr(), header.size.min(new_size.get())) };
            // SAFETY: ✔️ `ptr` is live and belongs to `self`, and nothing refers to it anymore
            unsafe { self.free(ptr) };
            return Ok(Resized { block, old_footprint });
        }

        let raw_size = Self::plain_size(new_size)?;
        // SAFETY: ✔️ `ptr` is live, and plain blocks start `HEADER` bytes into `raw`
        let raw = unsafe { self.0.realloc_uninit(Self::raw(ptr, header), raw_size) }.map_err(|_| ())?;
        // SAFETY: ✔️ `raw` was just reallocated with `new_size + HEADER` bytes
        let block = Self::uninit(unsafe { Self::stamp(raw.cast(), new_size.get()) });
        Ok(Resized { block, old_footprint })
    }

    unsafe fn free(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per `Usable::free`'s documented safety preconditions
        let header = unsafe { Self::read(ptr) };
        let footprint = Self::footprint_of(header);
        // SAFETY: ✔️ `footprint` is exactly what was requested from the backend for `raw`
        unsafe { self.0.free_sized(Self::raw(ptr, header), footprint) };
        footprint
    }

    unsafe fn free_with_size(&self, ptr: AllocNN, usable: usize) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per `Usable::free_with_size`'s documented safety preconditions
        let header = unsafe { Self::read(ptr) };
        debug_assert_eq!(usable, header.size, "bug: undefined behavior: free_with_size was passed the wrong usable size");
        let footprint = Self::footprint_of(header);
        // SAFETY: ✔️ `footprint` is exactly what was requested from the backend for `raw`
        unsafe { self.0.free_sized(Self::raw(ptr, header), footprint) };
        footprint
    }

    unsafe fn usable_size(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per `Usable::usable_size`'s documented safety preconditions
        unsafe { Self::read(ptr) }.size
    }

    unsafe fn footprint(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per `Usable::footprint`'s documented safety preconditions
        let header = unsafe { Self::read(ptr) };
        Self::footprint_of(header)
    }
}



#[cfg(test)] mod tests {
    use super::*;
    #[cfg(feature = "c")] use crate::allocator::c::Malloc;
    #[cfg(feature = "c")] use crate::allocator::debug::Limit;
    use crate::allocator::debug::Null;

    fn nz(n: usize) -> NonZeroUsize { NonZeroUsize::new(n).unwrap() }

    #[cfg(feature = "c")] #[test] fn header_width() {
        let header = SizeHeader::<Malloc>::HEADER;
        assert!(header >= 2 * size_of::<usize>());
        assert_eq!(0, header % <Malloc as thin::Alloc>::MAX_ALIGN);
    }

    #[cfg(feature = "c")] #[test] fn alloc_stamps_requested_size() {
        let s = SizeHeader(Malloc);
        for n in [1, 7, 8, 100, 4096] {
            let block = s.alloc_uninit(nz(n)).unwrap();
            assert_eq!(block.usable, n);
            assert_eq!(block.footprint, n + SizeHeader::<Malloc>::HEADER);
            assert_eq!(0, block.ptr.as_ptr() as usize % <Malloc as thin::Alloc>::MAX_ALIGN);
            assert_eq!(n, unsafe { s.usable_size(block.ptr) });
            assert_eq!(block.footprint, unsafe { s.footprint(block.ptr) });
            assert_eq!(block.footprint, unsafe { s.free(block.ptr) });
        }
    }

    #[cfg(feature = "c")] #[test] fn zeroed() {
        let s = SizeHeader(Malloc);
        let block = s.alloc_zeroed(nz(333)).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(block.ptr.as_ptr(), 333) };
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(333, unsafe { s.usable_size(block.ptr.cast()) });
        assert_eq!(block.footprint, unsafe { s.free_with_size(block.ptr.cast(), 333) });
    }

    #[cfg(feature = "c")] #[test] fn realloc_rewrites_header() {
        let s = SizeHeader(Malloc);
        let block = s.alloc_uninit(nz(16)).unwrap();
        for i in 0 .. 16 { unsafe { block.ptr.as_ptr().add(i).write(core::mem::MaybeUninit::new(i as u8)) } }

        let grown = unsafe { s.realloc_uninit(block.ptr, nz(10_000)) }.unwrap();
        assert_eq!(grown.old_footprint, block.footprint);
        assert_eq!(grown.block.usable, 10_000);
        assert_eq!(10_000, unsafe { s.usable_size(grown.block.ptr) });
        for i in 0 .. 16 { assert_eq!(i as u8, unsafe { grown.block.ptr.as_ptr().add(i).read().assume_init() }) }

        let shrunk = unsafe { s.realloc_uninit(grown.block.ptr, nz(3)) }.unwrap();
        assert_eq!(shrunk.old_footprint, grown.block.footprint);
        assert_eq!(3, unsafe { s.usable_size(shrunk.block.ptr) });
        unsafe { s.free(shrunk.block.ptr) };
    }

    #[cfg(feature = "c")] #[test] fn failed_realloc_keeps_header() {
        let s = SizeHeader(Limit::new(Malloc, 1000));
        let block = s.alloc_uninit(nz(100)).unwrap();
        assert!(unsafe { s.realloc_uninit(block.ptr, nz(5000)) }.is_err());
        assert_eq!(100, unsafe { s.usable_size(block.ptr) });
        unsafe { s.free(block.ptr) };
    }

    #[cfg(feature = "c")] #[test] fn over_aligned() {
        let s = SizeHeader(Malloc);
        let header = SizeHeader::<Malloc>::HEADER;
        for align in [32, 128, 512, 4096, 1 << 16] {
            for n in [1, 100, 512, 5000] {
                let block = s.alloc_aligned(nz(n), align).unwrap();
                assert_eq!(0, block.ptr.as_ptr() as usize % align, "{n} bytes @ {align}");
                assert_eq!(n, block.usable);
                assert_eq!(n + header + size_of::<usize>() + align, block.footprint);
                assert_eq!(n, unsafe { s.usable_size(block.ptr) });
                assert_eq!(block.footprint, unsafe { s.footprint(block.ptr) });
                unsafe { core::slice::from_raw_parts_mut(block.ptr.as_ptr(), n) }.fill(core::mem::MaybeUninit::new(0xA5));
                assert_eq!(block.footprint, unsafe { s.free(block.ptr) });
            }
        }
    }

    #[cfg(feature = "c")] #[test] fn over_aligned_within_max_align_is_plain() {
        let s = SizeHeader(Malloc);
        let block = s.alloc_aligned(nz(40), <Malloc as thin::Alloc>::MAX_ALIGN).unwrap();
        assert_eq!(40 + SizeHeader::<Malloc>::HEADER, block.footprint);
        assert_eq!(block.footprint, unsafe { s.free_with_size(block.ptr, 40) });
        assert!(s.alloc_aligned(nz(40), 48).is_err());
    }

    #[cfg(feature = "c")] #[test] fn over_aligned_realloc_copies() {
        let s = SizeHeader(Malloc);
        let block = s.alloc_aligned(nz(64), 256).unwrap();
        for i in 0 .. 64 { unsafe { block.ptr.as_ptr().add(i).write(core::mem::MaybeUninit::new(i as u8)) } }

        let grown = unsafe { s.realloc_uninit(block.ptr, nz(1000)) }.unwrap();
        assert_eq!(block.footprint, grown.old_footprint);
        assert_eq!(1000 + SizeHeader::<Malloc>::HEADER, grown.block.footprint);
        for i in 0 .. 64 { assert_eq!(i as u8, unsafe { grown.block.ptr.as_ptr().add(i).read().assume_init() }) }
        unsafe { s.free(grown.block.ptr) };

        let failing = SizeHeader(Limit::new(Malloc, 2000));
        let block = failing.alloc_aligned(nz(64), 256).unwrap();
        assert!(unsafe { failing.realloc_uninit(block.ptr, nz(4000)) }.is_err());
        assert_eq!(64, unsafe { failing.usable_size(block.ptr) });
        unsafe { failing.free(block.ptr) };
    }

    #[test] fn overflowing_header_never_reaches_backend() {
        // Null would panic if freed, but simply fails allocations - what matters is we fail before the add wraps
        assert!(SizeHeader(Null).alloc_uninit(nz(usize::MAX)).is_err());
        assert!(SizeHeader(Null).alloc_zeroed(nz(usize::MAX - 1)).is_err());
        assert!(SizeHeader(Null).alloc_aligned(nz(usize::MAX - 64), 1 << 12).is_err());
        assert!(SizeHeader(Null).alloc_aligned(nz(64), 1 << (usize::BITS - 1)).is_err());
    }
}
