//! [`ShardedCounter`]: a byte total that threads update without contending.
//!
//! Every thread claims a process-wide index the first time it touches any counter.
//! Within a counter, that index selects a cache-line sized slot which only that thread ever writes,
//! so updating it is a plain relaxed load + store, no read-modify-write.
//! Threads whose index doesn't fit in `SLOTS` share a `fetch_add`/`fetch_sub` overflow accumulator instead.
//!
//! | Operation                         | Cost                                      | Exactness                         |
//! | ----------------------------------| ------------------------------------------| ----------------------------------|
//! | [`add`](ShardedCounter::add) / [`sub`](ShardedCounter::sub) | one uncontended load + store  | exact
//! | [`total`](ShardedCounter::total)  | one load per registered slot              | exact at quiescence, a best-effort snapshot otherwise
//!
//! All arithmetic wraps.  Memory allocated on one thread and freed on another drives the freeing
//! thread's slot "negative", but the wrapping sum over every slot stays exact.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};



/// Slot count of [`DefaultCounter`]: enough for the threads of a typical server process.
pub const DEFAULT_SLOTS : usize = 132;

/// A [`ShardedCounter`] with [`DEFAULT_SLOTS`].
pub type DefaultCounter = ShardedCounter<DEFAULT_SLOTS>;

/// Process-wide thread index source.  Indices are never reclaimed.
static NEXT_THREAD : AtomicUsize = AtomicUsize::new(0);

/// Sentinel for "thread local storage is unavailable", which always lands in the overflow accumulator.
const NO_INDEX : usize = usize::MAX;

std::thread_local! {
    static THREAD_INDEX : Cell<usize> = const { Cell::new(NO_INDEX) };
}

/// The calling thread's index, claiming one on first use.
///
/// Allocations made while thread locals are being torn down still need accounting,
/// so those report [`NO_INDEX`] instead of panicking.
fn thread_index() -> usize {
    THREAD_INDEX.try_with(|index| {
        let i = index.get();
        if i != NO_INDEX { return i }
        let i = NEXT_THREAD.fetch_add(1, Relaxed);
        index.set(i);
        i
    }).unwrap_or(NO_INDEX)
}

/// Threads that have claimed an index so far.
pub fn registered_threads() -> usize { NEXT_THREAD.load(Relaxed) }



#[cfg_attr(any(target_arch = "aarch64", target_arch = "powerpc64"), repr(align(128)))]
#[cfg_attr(not(any(target_arch = "aarch64", target_arch = "powerpc64")), repr(align(64)))]
#[derive(Default)] struct Slot(AtomicUsize);

impl Slot {
    const fn new() -> Self { Self(AtomicUsize::new(0)) }
}

/// A wrapping byte total, sharded per thread.  See the [module docs](self).
pub struct ShardedCounter<const SLOTS: usize = DEFAULT_SLOTS> {
    slots:      [Slot; SLOTS],
    overflow:   Slot,
}

impl<const SLOTS: usize> ShardedCounter<SLOTS> {
    pub const fn new() -> Self {
        Self { slots: [const { Slot::new() }; SLOTS], overflow: Slot::new() }
    }

    /// Add `bytes` to the calling thread's share.
    #[inline] pub fn add(&self, bytes: usize) {
        match self.slots.get(thread_index()) {
            // only this thread ever writes this slot, so no read-modify-write is needed
            Some(slot)  => slot.0.store(slot.0.load(Relaxed).wrapping_add(bytes), Relaxed),
            None        => { self.overflow.0.fetch_add(bytes, Relaxed); },
        }
    }

    /// Subtract `bytes` from the calling thread's share (which may wrap below zero).
    #[inline] pub fn sub(&self, bytes: usize) {
        match self.slots.get(thread_index()) {
            Some(slot)  => slot.0.store(slot.0.load(Relaxed).wrapping_sub(bytes), Relaxed),
            None        => { self.overflow.0.fetch_sub(bytes, Relaxed); },
        }
    }

    /// Wrapping sum of every slot plus the overflow accumulator.
    pub fn total(&self) -> usize {
        let used = registered_threads().min(SLOTS);
        self.slots[..used].iter().fold(self.overflow.0.load(Relaxed), |total, slot| total.wrapping_add(slot.0.load(Relaxed)))
    }

    /// Number of per-thread slots (excluding the overflow accumulator).
    pub const fn slots(&self) -> usize { SLOTS }
}

impl<const SLOTS: usize> Default for ShardedCounter<SLOTS> {
    fn default() -> Self { Self::new() }
}

impl<const SLOTS: usize> core::fmt::Debug for ShardedCounter<SLOTS> {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_struct("ShardedCounter").field("slots", &SLOTS).field("total", &self.total()).finish()
    }
}



#[test] fn single_thread() {
    let c = DefaultCounter::new();
    assert_eq!(DEFAULT_SLOTS, c.slots());
    assert_eq!(0, c.total());
    c.add(100);
    c.add(28);
    assert_eq!(128, c.total());
    c.sub(128);
    assert_eq!(0, c.total());
}

#[test] fn cross_thread_free_wraps_back_to_zero() {
    let c = DefaultCounter::new();
    c.add(4096);
    std::thread::scope(|s| { s.spawn(|| c.sub(4096)); });
    assert_eq!(0, c.total());
}

#[test] fn overflow_accumulator() {
    // with no slots, every thread shares the accumulator
    let c = ShardedCounter::<0>::new();
    assert_eq!(0, c.slots());
    std::thread::scope(|s| {
        for _ in 0 .. 4 { s.spawn(|| for _ in 0 .. 1000 { c.add(3); c.sub(1) }); }
    });
    assert_eq!(4 * 1000 * 2, c.total());
}

#[test] fn slot_layout() {
    assert!(core::mem::align_of::<Slot>() >= 64);
    assert_eq!(0, core::mem::size_of::<ShardedCounter<4>>() % core::mem::align_of::<Slot>());
}

#[test] fn thread_index_is_stable() {
    let a = thread_index();
    assert_eq!(a, thread_index());
    let b = std::thread::spawn(thread_index).join().unwrap();
    assert_ne!(a, b);
    assert!(registered_threads() > a.max(b));
}
