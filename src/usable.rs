//! [`Usable`]: the one contract [`Accountant`](crate::Accountant) is written against.
//!
//! | Strategy                                                      | Backend requirement   | Usable size           | Accounted size        | Over-aligned blocks |
//! | --------------------------------------------------------------| ----------------------| ----------------------| ----------------------| --------------------|
//! | [`adapt::Native`](crate::allocator::adapt::Native)            | [`thin::SizeOf`]      | `size_of(ptr)`        | `size_of(ptr)`        | only via [`thin::Alloc::alloc_aligned`]
//! | [`adapt::SizeHeader`](crate::allocator::adapt::SizeHeader)    | none                  | header                | header + prefix       | always, by offsetting into a larger block
//!
//! The strategy is a type parameter, so the choice is made once at build time and every call is statically dispatched.

use crate::*;

use core::num::NonZeroUsize;



/// A live allocation as seen by the accounting layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)] pub struct Block<P = AllocNN> {
    /// The caller-visible pointer.
    pub ptr:        P,
    /// Bytes the caller may read/write at `ptr` (`>=` the clamped request).
    pub usable:     usize,
    /// Bytes taken from the backend on behalf of this allocation.
    pub footprint:  usize,
}

/// A completed resize: the new block, plus the footprint the old one had.
#[derive(Clone, Copy, Debug, PartialEq, Eq)] pub struct Resized {
    pub block:          Block,
    pub old_footprint:  usize,
}

/// Allocate, resize, free, and report sizes of caller-visible allocations.
///
/// ### Safety
/// Implementors promise that:
/// *   Every [`Block::ptr`] is aligned to at least [`MAX_ALIGN`](Self::MAX_ALIGN) and valid for [`Block::usable`] bytes.
/// *   [`footprint`](Self::footprint) of a live pointer always equals the [`Block::footprint`] it was last returned with,
///     and [`free`](Self::free) returns that same figure.  Accounting relies on this to never drift.
pub unsafe trait Usable : thin::Introspect {
    /// Alignment guaranteed for every caller-visible pointer.
    const MAX_ALIGN : usize;

    /// Allocate at least `size` bytes of uninitialized memory.
    fn alloc_uninit(&self, size: NonZeroUsize) -> Result<Block, ()>;

    /// Allocate at least `size` bytes of memory, the first `size` of which are zeroed.
    fn alloc_zeroed(&self, size: NonZeroUsize) -> Result<Block<AllocNN0>, ()>;

    /// Allocate at least `size` bytes of uninitialized memory aligned to `align`, a power of two beyond [`MAX_ALIGN`](Self::MAX_ALIGN).
    ///
    /// The result is resized, freed and sized like any other block.
    /// Resizing it only keeps [`MAX_ALIGN`](Self::MAX_ALIGN) alignment.
    fn alloc_aligned(&self, size: NonZeroUsize, align: usize) -> Result<Block, ()>;

    /// Resize `ptr` to at least `new_size` bytes, preserving contents up to the smaller of the two sizes.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`
    /// *   On success, `ptr` is dangling.  On failure, `ptr` is untouched and still live.
    unsafe fn realloc_uninit(&self, ptr: AllocNN, new_size: NonZeroUsize) -> Result<Resized, ()>;

    /// Free `ptr`, returning its footprint.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`, and is dangling afterwards
    unsafe fn free(&self, ptr: AllocNN) -> usize;

    /// Free `ptr` whose usable size is already known, returning its footprint.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`, and is dangling afterwards
    /// *   `usable` must be exactly <code>[usable_size](Self::usable_size)\(ptr\)</code>
    unsafe fn free_with_size(&self, ptr: AllocNN, usable: usize) -> usize;

    /// Bytes the caller may use at `ptr`.
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`
    unsafe fn usable_size(&self, ptr: AllocNN) -> usize;

    /// Bytes taken from the backend for `ptr` (what the accounting records).
    ///
    /// ### Safety
    /// *   `ptr` must be a live allocation from `self`
    unsafe fn footprint(&self, ptr: AllocNN) -> usize;
}
