//! [`Accountant`]: the allocate/resize/free API, with live-byte accounting and an OOM policy.
//!
//! Every operation comes in two forms:
//!
//! | Form      | On failure                                                | Example                                       |
//! | ----------| ----------------------------------------------------------| ----------------------------------------------|
//! | try       | returns <code>[Err]\([AllocError]\)</code>, state untouched | [`try_alloc`](Accountant::try_alloc)
//! | or-fail   | calls the [`OomHandler`] with the original request        | [`alloc`](Accountant::alloc)
//!
//! The `*_usable` variants additionally report how many bytes the caller may use, which is always at
//! least what was requested.  [`used_memory`](Accountant::used_memory) only changes when an operation succeeds.

use crate::*;
use crate::counter::{DEFAULT_SLOTS, ShardedCounter};
use crate::error::AllocError;
use crate::oom::OomPolicy;
use crate::usable::Block;

use core::alloc::{GlobalAlloc, Layout};
use core::ffi::CStr;
use core::ptr::{self, NonNull};



/// Allocates through a [`Usable`] strategy `S`, tracking live bytes in a [`ShardedCounter`] of `SLOTS` slots.
///
/// `new` is `const`, so the usual arrangement is one `static` per process - see [`global::GLOBAL`](crate::global::GLOBAL).
/// Pointers must be freed or resized by the same `Accountant` that produced them.
pub struct Accountant<S, const SLOTS: usize = DEFAULT_SLOTS> {
    strategy:   S,
    counter:    ShardedCounter<SLOTS>,
    oom:        OomPolicy,
}

impl<S, const SLOTS: usize> Accountant<S, SLOTS> {
    /// Account for allocations made through `strategy`, using [`oom::default_handler`] until told otherwise.
    pub const fn new(strategy: S) -> Self {
        Self { strategy, counter: ShardedCounter::new(), oom: OomPolicy::new() }
    }

    /// The strategy (and through it, the backend) allocations are made with.
    pub const fn strategy(&self) -> &S { &self.strategy }

    /// Live bytes taken from the backend through `self`, summed over every thread.
    ///
    /// Exact once all threads are quiescent.  While other threads are (de)allocating, this is a best-effort snapshot.
    pub fn used_memory(&self) -> usize { self.counter.total() }

    /// Replace the handler or-fail forms call on failure.
    pub fn set_oom_handler(&self, handler: OomHandler) { self.oom.set(handler) }

    /// The handler or-fail forms currently call on failure.
    pub fn oom_handler(&self) -> OomHandler { self.oom.get() }

    fn record<P>(&self, block: Block<P>) -> Block<P> {
        self.counter.add(block.footprint);
        block
    }
}

impl<S: Usable, const SLOTS: usize> Accountant<S, SLOTS> {
    // try forms

    /// Allocate at least `size` bytes of uninitialized memory.  `0` is rounded up to [`size::MIN_SIZE`].
    pub fn try_alloc(&self, size: usize) -> Result<AllocNN, AllocError> {
        self.try_alloc_usable(size).map(|(ptr, _)| ptr)
    }

    /// [`try_alloc`](Self::try_alloc), also returning the usable size.
    pub fn try_alloc_usable(&self, size: usize) -> Result<(AllocNN, usize), AllocError> {
        let request = size::request(size)?;
        let block = self.strategy.alloc_uninit(request).map_err(|()| AllocError::Exhausted { requested: size })?;
        let block = self.record(block);
        Ok((block.ptr, block.usable))
    }

    /// Allocate at least `size` bytes, the first `size` of which are zeroed.
    pub fn try_alloc_zeroed(&self, size: usize) -> Result<AllocNN0, AllocError> {
        self.try_alloc_zeroed_usable(size).map(|(ptr, _)| ptr)
    }

    /// [`try_alloc_zeroed`](Self::try_alloc_zeroed), also returning the usable size.
    pub fn try_alloc_zeroed_usable(&self, size: usize) -> Result<(AllocNN0, usize), AllocError> {
        let request = size::request(size)?;
        let block = self.strategy.alloc_zeroed(request).map_err(|()| AllocError::Exhausted { requested: size })?;
        let block = self.record(block);
        Ok((block.ptr, block.usable))
    }

    /// Allocate `count` zeroed elements of `elem` bytes each.
    ///
    /// Fails with <code>[AllocError::Overflow] { requested: [usize::MAX] }</code> if `count * elem` would overflow.
    pub fn try_alloc_zeroed_array(&self, count: usize, elem: usize) -> Result<AllocNN0, AllocError> {
        self.try_alloc_zeroed(size::checked_mul(count, elem)?)
    }

    /// Allocate at least `size` bytes of uninitialized memory aligned to `align`.
    ///
    /// Alignments up to <code>S::[MAX_ALIGN](Usable::MAX_ALIGN)</code> are plain allocations of a multiple of `align`.
    /// Beyond that, [`Usable::alloc_aligned`] decides, and resizing the result only keeps `S::MAX_ALIGN`.
    /// An `align` that isn't a power of two fails with [`AllocError::Overflow`].
    pub fn try_alloc_aligned(&self, size: usize, align: usize) -> Result<AllocNN, AllocError> {
        let layout = Layout::from_size_align(size, align).map_err(|_| AllocError::Overflow { requested: size })?;
        if let Some(plain) = Self::plain_size(layout) { return self.try_alloc(plain).map_err(|err| err.with_requested(size)) }
        let request = size::request(size)?;
        let block = self.strategy.alloc_aligned(request, align).map_err(|()| AllocError::Exhausted { requested: size })?;
        Ok(self.record(block).ptr)
    }

    /// Resize `ptr` to at least `size` bytes.
    ///
    /// | `ptr`         | `size`                    | Result                                                            |
    /// | --------------| --------------------------| ------------------------------------------------------------------|
    /// | [`None`]      | any                       | same as [`try_alloc`](Self::try_alloc)
    /// | [`Some`]      | `0`                       | `ptr` is freed, <code>[Ok]\([None]\)</code>
    /// | [`Some`]      | [`size::too_large`]       | `ptr` is freed, <code>[Err]\([AllocError::Overflow]\)</code>
    /// | [`Some`]      | backend failure           | `ptr` is untouched, <code>[Err]\([AllocError::Exhausted]\)</code>
    /// | [`Some`]      | otherwise                 | `ptr` is dangling, <code>[Ok]\([Some]\(new_ptr\)\)</code>
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`
    pub unsafe fn try_realloc(&self, ptr: Option<AllocNN>, size: usize) -> Result<Option<AllocNN>, AllocError> {
        // SAFETY: ✔️ same preconditions
        unsafe { self.try_realloc_usable(ptr, size) }.map(|(ptr, _)| ptr)
    }

    /// [`try_realloc`](Self::try_realloc), also returning the usable size (`0` when the result is [`None`]).
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`
    pub unsafe fn try_realloc_usable(&self, ptr: Option<AllocNN>, size: usize) -> Result<(Option<AllocNN>, usize), AllocError> {
        let Some(ptr) = ptr else { return self.try_alloc_usable(size).map(|(ptr, usable)| (Some(ptr), usable)) };

        if size == 0 {
            // SAFETY: ✔️ `ptr` is live and belongs to `self` per the fn's preconditions
            unsafe { self.free(Some(ptr)) };
            return Ok((None, 0));
        }

        let request = match size::request(size) {
            Ok(request) => request,
            Err(err) => {
                // the old contents can't be kept safely, but mustn't leak either
                // SAFETY: ✔️ `ptr` is live and belongs to `self` per the fn's preconditions
                unsafe { self.free(Some(ptr)) };
                return Err(err.into());
            },
        };

        // SAFETY: ✔️ `ptr` is live and belongs to `self` per the fn's preconditions
        let resized = unsafe { self.strategy.realloc_uninit(ptr, request) }.map_err(|()| AllocError::Exhausted { requested: size })?;
        self.counter.sub(resized.old_footprint);
        let block = self.record(resized.block);
        Ok((Some(block.ptr), block.usable))
    }



    // or-fail forms

    /// [`try_alloc`](Self::try_alloc), calling the [`OomHandler`] on failure.
    #[track_caller] pub fn alloc(&self, size: usize) -> AllocNN {
        self.alloc_usable(size).0
    }

    /// [`try_alloc_usable`](Self::try_alloc_usable), calling the [`OomHandler`] on failure.
    #[track_caller] pub fn alloc_usable(&self, size: usize) -> (AllocNN, usize) {
        self.try_alloc_usable(size).unwrap_or_else(|err| self.oom.fail(err.requested()))
    }

    /// [`try_alloc_zeroed`](Self::try_alloc_zeroed), calling the [`OomHandler`] on failure.
    #[track_caller] pub fn alloc_zeroed(&self, size: usize) -> AllocNN0 {
        self.alloc_zeroed_usable(size).0
    }

    /// [`try_alloc_zeroed_usable`](Self::try_alloc_zeroed_usable), calling the [`OomHandler`] on failure.
    #[track_caller] pub fn alloc_zeroed_usable(&self, size: usize) -> (AllocNN0, usize) {
        self.try_alloc_zeroed_usable(size).unwrap_or_else(|err| self.oom.fail(err.requested()))
    }

    /// [`try_alloc_zeroed_array`](Self::try_alloc_zeroed_array), calling the [`OomHandler`] on failure
    /// (with [`usize::MAX`] if `count * elem` overflowed).
    #[track_caller] pub fn alloc_zeroed_array(&self, count: usize, elem: usize) -> AllocNN0 {
        self.try_alloc_zeroed_array(count, elem).unwrap_or_else(|err| self.oom.fail(err.requested()))
    }

    /// [`try_alloc_aligned`](Self::try_alloc_aligned), calling the [`OomHandler`] on failure.
    #[track_caller] pub fn alloc_aligned(&self, size: usize, align: usize) -> AllocNN {
        self.try_alloc_aligned(size, align).unwrap_or_else(|err| self.oom.fail(err.requested()))
    }

    /// [`try_realloc`](Self::try_realloc), calling the [`OomHandler`] on failure.
    ///
    /// Only [`None`] when `size` is `0`.
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`
    #[track_caller] pub unsafe fn realloc(&self, ptr: Option<AllocNN>, size: usize) -> Option<AllocNN> {
        // SAFETY: ✔️ same preconditions
        unsafe { self.realloc_usable(ptr, size) }.0
    }

    /// [`try_realloc_usable`](Self::try_realloc_usable), calling the [`OomHandler`] on failure.
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`
    #[track_caller] pub unsafe fn realloc_usable(&self, ptr: Option<AllocNN>, size: usize) -> (Option<AllocNN>, usize) {
        // SAFETY: ✔️ same preconditions
        match unsafe { self.try_realloc_usable(ptr, size) } {
            Ok(r) => r,
            // a zero sized resize of nothing isn't worth dying over
            Err(_) if size == 0 => (None, 0),
            Err(err) => self.oom.fail(err.requested()),
        }
    }



    // everything else

    /// Free `ptr` (a no-op for [`None`]).
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`, and is dangling afterwards
    pub unsafe fn free(&self, ptr: Option<AllocNN>) {
        let Some(ptr) = ptr else { return };
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per the fn's preconditions
        let footprint = unsafe { self.strategy.free(ptr) };
        self.counter.sub(footprint);
    }

    /// Free `ptr` whose usable size is already known, sparing the backend a size lookup.
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`, and is dangling afterwards
    /// *   `usable` must be exactly <code>[usable_size](Self::usable_size)\(ptr\)</code>
    pub unsafe fn free_with_size(&self, ptr: Option<AllocNN>, usable: usize) {
        let Some(ptr) = ptr else { return };
        // SAFETY: ✔️ `ptr` is live, belongs to `self`, and has `usable` bytes, per the fn's preconditions
        let footprint = unsafe { self.strategy.free_with_size(ptr, usable) };
        self.counter.sub(footprint);
    }

    /// Bytes the caller may use at `ptr`: at least what was requested.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`
    pub unsafe fn usable_size(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ same preconditions
        unsafe { self.strategy.usable_size(ptr) }
    }

    /// Bytes [`used_memory`](Self::used_memory) counts for `ptr`.
    ///
    /// Equal to [`usable_size`](Self::usable_size) for [`adapt::Native`](crate::allocator::adapt::Native) strategies.
    /// [`adapt::SizeHeader`](crate::allocator::adapt::SizeHeader) strategies also count their hidden header.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`
    pub unsafe fn allocation_size(&self, ptr: AllocNN) -> usize {
        // SAFETY: ✔️ same preconditions
        unsafe { self.strategy.footprint(ptr) }
    }

    /// Copy `s`, including its nul terminator, into a new allocation of `s.count_bytes() + 1` bytes.
    ///
    /// Calls the [`OomHandler`] on failure.
    #[track_caller] pub fn dup_cstr(&self, s: &CStr) -> AllocNN0 {
        let bytes = s.to_bytes_with_nul();
        let ptr = self.alloc(bytes.len()).cast::<u8>();
        // SAFETY: ✔️ `ptr` was just allocated with at least `bytes.len()` bytes, and can't overlap `bytes`
        unsafe { ptr.as_ptr().copy_from_nonoverlapping(bytes.as_ptr(), bytes.len()) };
        ptr
    }

    /// Tell the OS it may drop the whole pages within `ptr`'s usable bytes, returning how many bytes were released.
    ///
    /// Meant for a forked child about to free memory it shares copy-on-write with its parent.
    /// Small allocations can't contain a whole page: a nonzero `size_hint` under two pages skips the size lookup entirely.
    /// Accounting is unaffected, and `ptr` stays live.  Released pages read as zeros afterwards.
    /// Always `0` where the [`host`](crate::host) can't release pages.
    ///
    /// ### Safety
    /// *   `ptr` must be [`None`], or a live allocation from `self`
    /// *   The caller must not rely on the contents of `ptr` afterwards
    pub unsafe fn advise_dontneed(&self, ptr: Option<AllocNN>, size_hint: usize) -> usize {
        use crate::host::HostMemory;
        let Some(ptr) = ptr else { return 0 };
        let host = crate::host::Host::default();
        let page = host.page_size();
        if page == 0 || (size_hint != 0 && size_hint / 2 < page) { return 0 }
        // SAFETY: ✔️ `ptr` is live and belongs to `self` per the fn's preconditions
        let usable = unsafe { self.usable_size(ptr) };
        if usable < page { return 0 }
        // SAFETY: ✔️ `ptr[..usable]` belongs to the caller, who no longer needs its contents, per the fn's preconditions
        unsafe { host.release_pages(ptr.cast(), usable) }
    }

    /// Backend-wide statistics, zero-filled where the backend doesn't track them.
    pub fn allocator_info(&self) -> thin::AllocatorInfo { self.strategy.info() }

    /// Enable or disable the backend's background maintenance threads, if it has any.
    pub fn set_background_thread(&self, enable: bool) { self.strategy.set_background_thread(enable) }

    /// Ask the backend to return unused pages to the OS.
    pub fn purge(&self) -> thin::Purge {
        let result = self.strategy.purge();
        log::debug!("purge: {result:?}");
        result
    }

    /// The byte count to request for `layout` as a plain allocation, or [`None`] if it's aligned beyond the strategy's `MAX_ALIGN`.
    ///
    /// Rounding up to a multiple of the alignment is what lets size-class allocators align small requests.
    fn plain_size(layout: Layout) -> Option<usize> {
        if layout.align() > S::MAX_ALIGN { return None }
        Some(layout.pad_to_align().size().max(layout.align()))
    }
}

impl<S: core::fmt::Debug, const SLOTS: usize> core::fmt::Debug for Accountant<S, SLOTS> {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_struct("Accountant").field("strategy", &self.strategy).field("used_memory", &self.used_memory()).field("oom", &self.oom).finish()
    }
}



/// Lets an `Accountant` serve as the Rust `#[global_allocator]`.
///
/// | Safety Item   | Description   |
/// | --------------| --------------|
/// | `align`       | ✔️ layouts aligned beyond <code>S::[MAX_ALIGN](Usable::MAX_ALIGN)</code> go through [`Usable::alloc_aligned`], the rest request a multiple of their alignment
/// | `size`        | ✔️ the strategy provides at least the requested size
/// | `realloc`     | ✔️ sizes tripping [`size::too_large`] fail (null) *before* [`Accountant::try_realloc`] could free the old allocation.  Over-aligned blocks are moved by allocate + copy + free, so they stay aligned.
/// | `unwind`      | ✔️ only the try forms are used, so the [`OomHandler`] is never called from here
// SAFETY: per above
unsafe impl<S: Usable, const SLOTS: usize> GlobalAlloc for Accountant<S, SLOTS> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.try_alloc_aligned(layout.size(), layout.align()).map_or(ptr::null_mut(), |ptr| ptr.as_ptr().cast())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        match Self::plain_size(layout) {
            Some(size) => self.try_alloc_zeroed(size).map_or(ptr::null_mut(), |ptr| ptr.as_ptr()),
            None => match self.try_alloc_aligned(layout.size(), layout.align()) {
                Ok(ptr) => {
                    let ptr = ptr.as_ptr().cast::<u8>();
                    // SAFETY: ✔️ `ptr` was just allocated with at least `layout.size()` bytes
                    unsafe { ptr.write_bytes(0, layout.size()) };
                    ptr
                },
                Err(_) => ptr::null_mut(),
            },
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: ✔️ `ptr` was allocated by `self` per GlobalAlloc::dealloc's documented safety preconditions
        unsafe { self.free(NonNull::new(ptr.cast())) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else { return ptr::null_mut() };
        let Some(size) = Self::plain_size(new_layout) else {
            let Ok(new) = self.try_alloc_aligned(new_size, layout.align()) else { return ptr::null_mut() };
            let new = new.as_ptr().cast::<u8>();
            // SAFETY: ✔️ `ptr` is live for `layout.size()` bytes, `new` for `new_size`, and they're distinct allocations
            unsafe { new.copy_from_nonoverlapping(ptr, layout.size().min(new_size)) };
            // SAFETY: ✔️ `ptr` was allocated by `self` per GlobalAlloc::realloc's documented safety preconditions, and has been moved
            unsafe { self.free(NonNull::new(ptr.cast())) };
            return new;
        };
        if size::too_large(size) { return ptr::null_mut() }
        // SAFETY: ✔️ `ptr` was allocated by `self` per GlobalAlloc::realloc's documented safety preconditions
        // SAFETY: ✔️ `size` is nonzero and not too large, so failure leaves `ptr` untouched
        match unsafe { self.try_realloc(NonNull::new(ptr.cast()), size) } {
            Ok(Some(ptr))   => ptr.as_ptr().cast(),
            Ok(None) | Err(_) => ptr::null_mut(),
        }
    }
}



/// Lets a `static` reference to an `Accountant` (e.g. <code>&amp;[global::GLOBAL]</code>) serve as the Rust `#[global_allocator]`.
// SAFETY: ✔️ pure forwarding
unsafe impl<S: Usable, const SLOTS: usize> GlobalAlloc for &'_ Accountant<S, SLOTS> {
    // SAFETY: ✔️ same preconditions as the forwarded-to impl
    unsafe fn alloc       (&self, layout: Layout) -> *mut u8 { unsafe { <Accountant<S, SLOTS> as GlobalAlloc>::alloc(*self, layout) } }
    // SAFETY: ✔️ same preconditions as the forwarded-to impl
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 { unsafe { <Accountant<S, SLOTS> as GlobalAlloc>::alloc_zeroed(*self, layout) } }
    // SAFETY: ✔️ same preconditions as the forwarded-to impl
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) { unsafe { <Accountant<S, SLOTS> as GlobalAlloc>::dealloc(*self, ptr, layout) } }
    // SAFETY: ✔️ same preconditions as the forwarded-to impl
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 { unsafe { <Accountant<S, SLOTS> as GlobalAlloc>::realloc(*self, ptr, layout, new_size) } }
}



#[cfg(test)] mod tests {
    use super::*;
    use crate::allocator::adapt::*;
    #[cfg(feature = "c")] use crate::allocator::debug::Limit;
    use crate::allocator::debug::Null;
    use std::panic::{AssertUnwindSafe, catch_unwind, panic_any};

    struct OomPanic(usize);
    fn panicking(size: usize) -> ! { panic_any(OomPanic(size)) }

    /// The size the OOM handler was called with while running `f`, if it was called.
    fn oom_size<S: Usable>(acct: &Accountant<S>, f: impl FnOnce(&Accountant<S>)) -> Option<usize> {
        acct.set_oom_handler(panicking);
        let err = catch_unwind(AssertUnwindSafe(|| f(acct))).err()?;
        match err.downcast::<OomPanic>() {
            Ok(oom) => Some(oom.0),
            Err(other) => std::panic::resume_unwind(other),
        }
    }

    /// `over_aligned`: whether the strategy can align beyond its `MAX_ALIGN`.
    fn properties<S: Usable>(acct: Accountant<S>, over_aligned: bool) {
        usable_at_least_requested(&acct);
        net_zero(&acct);
        zero_is_clamped(&acct);
        realloc_to_zero_frees(&acct);
        realloc_of_none_allocates(&acct);
        realloc_too_large_frees(&acct);
        zeroed(&acct);
        zeroed_array_overflow(&acct);
        free_with_size_matches_free(&acct);
        dup(&acct);
        global_alloc(&acct);
        if over_aligned { aligned(&acct) }
        assert_eq!(0, acct.used_memory());
    }

    fn usable_at_least_requested<S: Usable>(acct: &Accountant<S>) {
        for size in [1, 2, 3, 7, 8, 9, 15, 16, 17, 100, 1000, 4095, 4096, 4097, 100_000] {
            let (ptr, usable) = acct.alloc_usable(size);
            assert!(usable >= size, "{size} byte request only has {usable} usable bytes");
            assert_eq!(usable, unsafe { acct.usable_size(ptr) });
            unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), usable) }.fill(core::mem::MaybeUninit::new(0xAB));
            unsafe { acct.free(Some(ptr)) };
        }
    }

    fn net_zero<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let ptr = acct.alloc(1234);
        let size = unsafe { acct.allocation_size(ptr) };
        assert_eq!(before + size, acct.used_memory());
        unsafe { acct.free(Some(ptr)) };
        assert_eq!(before, acct.used_memory());
    }

    fn zero_is_clamped<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let (ptr, usable) = acct.alloc_usable(0);
        assert!(usable >= core::mem::size_of::<core::ffi::c_long>());
        let size = unsafe { acct.allocation_size(ptr) };
        assert!(size >= usable);
        assert_eq!(before + size, acct.used_memory());
        unsafe { acct.free(Some(ptr)) };
        assert_eq!(before, acct.used_memory());
    }

    fn realloc_to_zero_frees<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let ptr = acct.alloc(100);
        let size = unsafe { acct.allocation_size(ptr) };
        let after_alloc = acct.used_memory();
        assert_eq!((None, 0), unsafe { acct.realloc_usable(Some(ptr), 0) });
        assert_eq!(after_alloc - size, acct.used_memory());
        assert_eq!(before, acct.used_memory());
        // nothing to free, nothing to allocate, and no reason to call the OOM handler
        assert_eq!(None, oom_size(acct, |acct| { unsafe { acct.realloc(Some(acct.alloc(8)), 0) }; }));
    }

    fn realloc_of_none_allocates<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let (ptr, usable) = unsafe { acct.try_realloc_usable(None, 300) }.unwrap();
        let ptr = ptr.unwrap();
        assert!(usable >= 300);
        assert_eq!(before + unsafe { acct.allocation_size(ptr) }, acct.used_memory());

        let (grown, usable) = unsafe { acct.realloc_usable(Some(ptr), 5000) };
        assert!(usable >= 5000);
        assert_eq!(before + unsafe { acct.allocation_size(grown.unwrap()) }, acct.used_memory());
        unsafe { acct.free(grown) };
        assert_eq!(before, acct.used_memory());
    }

    fn realloc_too_large_frees<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let ptr = acct.alloc(64);
        let err = unsafe { acct.try_realloc(Some(ptr), usize::MAX - 5) }.unwrap_err();
        assert_eq!(AllocError::Overflow { requested: usize::MAX - 5 }, err);
        assert_eq!(before, acct.used_memory());

        assert_eq!(Some(size::TOO_LARGE), oom_size(acct, |acct| { unsafe { acct.realloc(Some(acct.alloc(64)), size::TOO_LARGE) }; }));
        assert_eq!(before, acct.used_memory());
    }

    fn zeroed<S: Usable>(acct: &Accountant<S>) {
        for size in [1, 24, 4096, 100_000] {
            let ptr = acct.alloc_zeroed(size);
            assert!(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), size) }.iter().all(|b| *b == 0));
            unsafe { acct.free(Some(ptr.cast())) };
        }
        let ptr = acct.alloc_zeroed_array(10, 12);
        assert!(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 120) }.iter().all(|b| *b == 0));
        assert!(unsafe { acct.usable_size(ptr.cast()) } >= 120);
        unsafe { acct.free(Some(ptr.cast())) };
    }

    fn zeroed_array_overflow<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        assert_eq!(Err(AllocError::Overflow { requested: usize::MAX }), acct.try_alloc_zeroed_array(usize::MAX / 2 + 1, 2));
        assert_eq!(Err(AllocError::Overflow { requested: usize::MAX }), acct.try_alloc_zeroed_array(4, 0));
        assert_eq!(Some(usize::MAX), oom_size(acct, |acct| { acct.alloc_zeroed_array(3, usize::MAX / 2 + 1); }));
        assert_eq!(before, acct.used_memory());
    }

    fn free_with_size_matches_free<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        let (ptr, usable) = acct.alloc_usable(777);
        unsafe { acct.free_with_size(Some(ptr), usable) };
        assert_eq!(before, acct.used_memory());
        unsafe { acct.free(None) };
        unsafe { acct.free_with_size(None, 0) };
        assert_eq!(before, acct.used_memory());
    }

    fn dup<S: Usable>(acct: &Accountant<S>) {
        let ptr = acct.dup_cstr(c"abc");
        assert!(unsafe { acct.usable_size(ptr.cast()) } >= 4);
        assert_eq!(b"abc\0", unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 4) });
        unsafe { acct.free(Some(ptr.cast())) };
    }

    fn global_alloc<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        for align in [1, 2, 4, 8, S::MAX_ALIGN] {
            for size in [1, 3, 24, 48, 1000] {
                let layout = Layout::from_size_align(size, align).unwrap();
                let ptr = unsafe { GlobalAlloc::alloc(acct, layout) };
                assert!(!ptr.is_null());
                assert_eq!(0, ptr as usize % align, "{layout:?}");
                let ptr = unsafe { GlobalAlloc::realloc(acct, ptr, layout, size * 3 + 1) };
                assert!(!ptr.is_null());
                assert_eq!(0, ptr as usize % align, "{layout:?}");
                unsafe { GlobalAlloc::dealloc(acct, ptr, Layout::from_size_align(size * 3 + 1, align).unwrap()) };
            }
        }

        let ptr = unsafe { GlobalAlloc::alloc_zeroed(acct, Layout::new::<[u64; 32]>()) };
        assert!(unsafe { core::slice::from_raw_parts(ptr, 256) }.iter().all(|b| *b == 0));
        // a failed realloc must leave the original allocation alone
        assert!(unsafe { GlobalAlloc::realloc(acct, ptr, Layout::new::<[u64; 32]>(), usize::MAX - 64) }.is_null());
        assert_eq!(0, unsafe { *ptr.add(255) });
        unsafe { GlobalAlloc::dealloc(acct, ptr, Layout::new::<[u64; 32]>()) };
        assert_eq!(before, acct.used_memory());
    }

    fn aligned<S: Usable>(acct: &Accountant<S>) {
        let before = acct.used_memory();
        for align in [S::MAX_ALIGN * 2, 128, 4096] {
            for size in [1, 100, 512, 10_000] {
                let ptr = acct.alloc_aligned(size, align);
                assert_eq!(0, ptr.as_ptr() as usize % align, "{size} bytes @ {align}");
                assert!(unsafe { acct.usable_size(ptr) } >= size);
                assert_eq!(before + unsafe { acct.allocation_size(ptr) }, acct.used_memory());
                unsafe { ptr.as_ptr().cast::<u8>().write_bytes(0x77, size) };

                // the direct API may drop the extra alignment, but never the contents or the count
                let (grown, usable) = unsafe { acct.realloc_usable(Some(ptr), size * 2) };
                let grown = grown.unwrap();
                assert!(usable >= size * 2);
                assert!(unsafe { core::slice::from_raw_parts(grown.as_ptr().cast::<u8>(), size) }.iter().all(|b| *b == 0x77));
                assert_eq!(before + unsafe { acct.allocation_size(grown) }, acct.used_memory());
                unsafe { acct.free(Some(grown)) };
                assert_eq!(before, acct.used_memory());
            }
        }

        // std boxes channel internals aligned to 128, so a #[global_allocator] must serve these
        for align in [S::MAX_ALIGN * 2, 128, 4096] {
            let layout = Layout::from_size_align(512, align).unwrap();
            let ptr = unsafe { GlobalAlloc::alloc(acct, layout) };
            assert!(!ptr.is_null());
            assert_eq!(0, ptr as usize % align);
            unsafe { ptr.write_bytes(0x33, 512) };
            let ptr = unsafe { GlobalAlloc::realloc(acct, ptr, layout, 3000) };
            assert!(!ptr.is_null());
            assert_eq!(0, ptr as usize % align, "realloc must keep {align} alignment");
            assert!(unsafe { core::slice::from_raw_parts(ptr, 512) }.iter().all(|b| *b == 0x33));
            unsafe { GlobalAlloc::dealloc(acct, ptr, Layout::from_size_align(3000, align).unwrap()) };

            let ptr = unsafe { GlobalAlloc::alloc_zeroed(acct, layout) };
            assert_eq!(0, ptr as usize % align);
            assert!(unsafe { core::slice::from_raw_parts(ptr, 512) }.iter().all(|b| *b == 0));
            unsafe { GlobalAlloc::dealloc(acct, ptr, layout) };
        }
        assert_eq!(before, acct.used_memory());

        assert_eq!(Err(AllocError::Overflow { requested: 64 }), acct.try_alloc_aligned(64, 48));
        assert_eq!(Err(AllocError::Overflow { requested: usize::MAX - 4096 }), acct.try_alloc_aligned(usize::MAX - 4096, 4096));
        assert_eq!(before, acct.used_memory());
    }

    #[cfg(feature = "c")] #[test] fn size_header_malloc() { properties(Accountant::new(SizeHeader(crate::allocator::c::Malloc)), true) }
    #[cfg(all(windows, feature = "win32"))] #[test] fn native_process_heap() { properties(Accountant::new(Native(crate::allocator::win32::ProcessHeap)), false) }
    #[cfg(all(windows, feature = "win32"))] #[test] fn size_header_process_heap() { properties(Accountant::new(SizeHeader(crate::allocator::win32::ProcessHeap)), true) }
    #[cfg(feature = "jemalloc")] #[test] fn native_jemalloc() { properties(Accountant::new(Native(crate::allocator::jemalloc::Jemalloc)), true) }
    #[cfg(feature = "jemalloc")] #[test] fn size_header_jemalloc() { properties(Accountant::new(SizeHeader(crate::allocator::jemalloc::Jemalloc)), true) }

    #[cfg(all(windows, feature = "win32"))] #[test] fn native_process_heap_refuses_over_alignment() {
        let acct : Accountant<_> = Accountant::new(Native(crate::allocator::win32::ProcessHeap));
        assert!(unsafe { GlobalAlloc::alloc(&acct, Layout::from_size_align(8, 64).unwrap()) }.is_null());
        assert_eq!(Err(AllocError::Exhausted { requested: 8 }), acct.try_alloc_aligned(8, 64));
        assert_eq!(0, acct.used_memory());
    }

    #[cfg(all(target_os = "linux", feature = "c"))] #[test] fn advise_dontneed() {
        use crate::host::HostMemory;
        let acct : Accountant<_> = Accountant::new(SizeHeader(crate::allocator::c::Malloc));
        let page = crate::host::Host::default().page_size();
        assert!(page.is_power_of_two());

        let size = 8 * page;
        let ptr = acct.alloc(size);
        unsafe { ptr.as_ptr().cast::<u8>().write_bytes(0xEE, size) };
        let used = acct.used_memory();

        assert_eq!(0, unsafe { acct.advise_dontneed(None, 0) });
        assert_eq!(0, unsafe { acct.advise_dontneed(Some(ptr), page) }, "hint says too small to hold a page");
        let released = unsafe { acct.advise_dontneed(Some(ptr), 0) };
        assert!(released >= 6 * page && released <= size, "{released}");
        assert_eq!(0, released % page);
        assert_eq!(used, acct.used_memory());

        // the released run starts at the first page boundary inside the allocation
        let start = (ptr.as_ptr() as usize).next_multiple_of(page) - ptr.as_ptr() as usize;
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr().cast::<u8>(), size) };
        assert!(bytes[start .. start + released].iter().all(|b| *b == 0));
        assert!(bytes[.. start].iter().all(|b| *b == 0xEE));
        assert!(bytes[start + released ..].iter().all(|b| *b == 0xEE));
        unsafe { acct.free(Some(ptr)) };
        assert_eq!(0, acct.used_memory());

        let small = acct.alloc(page / 2);
        assert_eq!(0, unsafe { acct.advise_dontneed(Some(small), 0) });
        unsafe { acct.free(Some(small)) };
    }

    #[cfg(feature = "c")] #[test] fn size_header_counts_header() {
        type Strategy = SizeHeader<crate::allocator::c::Malloc>;
        let acct : Accountant<_> = Accountant::new(Strategy::default());
        let (ptr, usable) = acct.alloc_usable(10);
        assert_eq!(10, usable);
        assert_eq!(10 + Strategy::HEADER, unsafe { acct.allocation_size(ptr) });
        assert_eq!(10 + Strategy::HEADER, acct.used_memory());
        unsafe { acct.free(Some(ptr)) };
        assert_eq!(0, acct.used_memory());
    }

    #[cfg(feature = "c")] #[test] fn failed_realloc_keeps_old() {
        let acct : Accountant<_> = Accountant::new(SizeHeader(Limit::new(crate::allocator::c::Malloc, 4096)));
        let ptr = acct.alloc(16);
        unsafe { ptr.as_ptr().cast::<u8>().write_bytes(0x5A, 16) };
        let used = acct.used_memory();

        assert_eq!(Err(AllocError::Exhausted { requested: 10_000 }), unsafe { acct.try_realloc(Some(ptr), 10_000) });
        assert_eq!(used, acct.used_memory());
        assert!(unsafe { core::slice::from_raw_parts(ptr.as_ptr().cast::<u8>(), 16) }.iter().all(|b| *b == 0x5A));

        assert_eq!(Some(10_000), oom_size(&acct, |acct| { unsafe { acct.realloc(Some(ptr), 10_000) }; }));
        assert_eq!(used, acct.used_memory());
        unsafe { acct.free(Some(ptr)) };
        assert_eq!(0, acct.used_memory());
    }

    #[test] fn exhausted() {
        let acct : Accountant<_> = Accountant::new(Native(Null));
        assert_eq!(Err(AllocError::Exhausted { requested: 0 }), acct.try_alloc(0));
        assert_eq!(Err(AllocError::Exhausted { requested: 10 }), acct.try_alloc_zeroed(10));
        assert_eq!(Err(AllocError::Overflow { requested: usize::MAX }), acct.try_alloc(usize::MAX));
        assert_eq!(Err(AllocError::Exhausted { requested: 0 }), unsafe { acct.try_realloc_usable(None, 0) });
        assert_eq!(Err(AllocError::Exhausted { requested: 3 }), acct.try_alloc_aligned(3, 4), "reports the request, not the rounded size");
        assert_eq!(0, acct.used_memory());

        assert_eq!(Some(42),            oom_size(&acct, |acct| { acct.alloc(42); }));
        assert_eq!(Some(0),             oom_size(&acct, |acct| { acct.alloc_zeroed(0); }));
        assert_eq!(Some(usize::MAX),    oom_size(&acct, |acct| { acct.alloc_usable(usize::MAX); }));
        assert_eq!(Some(7 * 9),         oom_size(&acct, |acct| { acct.alloc_zeroed_array(7, 9); }));
        assert_eq!(Some(100),           oom_size(&acct, |acct| { unsafe { acct.realloc(None, 100) }; }));
        assert_eq!(Some(70),            oom_size(&acct, |acct| { acct.alloc_aligned(70, 4096); }));
        assert_eq!(None,                oom_size(&acct, |acct| { assert_eq!((None, 0), unsafe { acct.realloc_usable(None, 0) }); }));
        assert!(unsafe { GlobalAlloc::alloc(&acct, Layout::new::<u32>()) }.is_null());
        assert_eq!(0, acct.used_memory());
    }

    #[test] fn handler_replacement() {
        let acct : Accountant<_> = Accountant::new(Native(Null));
        assert_eq!(acct.oom_handler() as usize, oom::default_handler as OomHandler as usize);
        acct.set_oom_handler(panicking);
        assert_eq!(acct.oom_handler() as usize, panicking as OomHandler as usize);
    }

    #[test] fn introspection_defaults() {
        let acct : Accountant<_> = Accountant::new(Native(Null));
        assert_eq!(&Native(Null), acct.strategy());
        assert_eq!(thin::AllocatorInfo::default(), acct.allocator_info());
        assert_eq!(thin::Purge::NotApplicable, acct.purge());
        acct.set_background_thread(true);
    }
}
