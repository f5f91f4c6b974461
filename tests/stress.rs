//! Many threads allocating, resizing and freeing at once must leave the total exactly where it started.
//!
//! Each allocation is filled with a pattern derived from its address and checked before it's resized
//! or freed, so a header clobbered by a neighbor shows up as corruption rather than a wrong total.

#![cfg(feature = "c")]

use tallyalloc::Accountant;
use tallyalloc::allocator::adapt::SizeHeader;
use tallyalloc::allocator::c::Malloc;

use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::Barrier;

type Ptr = NonNull<MaybeUninit<u8>>;

/// Plenty of slots: every thread owns one.
static WIDE   : Accountant<SizeHeader<Malloc>, 132>  = Accountant::new(SizeHeader(Malloc));
/// Too few slots: most threads share the overflow accumulator.
static NARROW : Accountant<SizeHeader<Malloc>, 2>    = Accountant::new(SizeHeader(Malloc));
/// No slots at all.
static NONE   : Accountant<SizeHeader<Malloc>, 0>    = Accountant::new(SizeHeader(Malloc));

const THREADS   : usize = 16;
const PAIRS     : usize = 2_000;

/// xorshift64, seeded per thread: deterministic sizes without a `rand` dependency.
struct Rng(u64);
impl Rng {
    fn next(&mut self) -> u64 { self.0 ^= self.0 << 13; self.0 ^= self.0 >> 7; self.0 ^= self.0 << 17; self.0 }
    fn size(&mut self) -> usize { match self.next() % 8 { 0 => 0, 1..=5 => (self.next() % 256) as usize, _ => (self.next() % 65536) as usize } }
}

fn fill_pattern(ptr: Ptr, size: usize) {
    let seed = ptr.as_ptr() as usize ^ size;
    for i in 0 .. size {
        unsafe { ptr.as_ptr().add(i).write(MaybeUninit::new((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9) & 0xFF) as u8)) };
    }
}

fn check_pattern(ptr: Ptr, size: usize) -> bool {
    let seed = ptr.as_ptr() as usize ^ size;
    (0 .. size).all(|i| unsafe { ptr.as_ptr().add(i).read().assume_init() } == (seed.wrapping_add(i).wrapping_mul(0x9E37_79B9) & 0xFF) as u8)
}

fn churn<const SLOTS: usize>(acct: &Accountant<SizeHeader<Malloc>, SLOTS>, seed: u64) {
    let mut rng = Rng(seed | 1);
    let mut live : Vec<(Ptr, usize)> = Vec::new();
    for round in 0 .. PAIRS {
        let size = rng.size();
        let ptr = acct.alloc(size);
        fill_pattern(ptr, size);
        live.push((ptr, size));

        if round % 3 == 0 {
            let i = rng.next() as usize % live.len();
            let (ptr, size) = live[i];
            assert!(check_pattern(ptr, size), "corruption before realloc");
            let new_size = rng.size().max(1);
            let kept = size.min(new_size);
            let before : Vec<u8> = (0 .. kept).map(|i| unsafe { ptr.as_ptr().add(i).read().assume_init() }).collect();
            let ptr = unsafe { acct.realloc(Some(ptr), new_size) }.unwrap();
            assert!((0 .. kept).all(|i| unsafe { ptr.as_ptr().add(i).read().assume_init() } == before[i]), "realloc lost contents");
            fill_pattern(ptr, new_size);
            live[i] = (ptr, new_size);
        }

        if live.len() > 32 {
            let (ptr, size) = live.swap_remove(rng.next() as usize % live.len());
            assert!(check_pattern(ptr, size), "corruption before free");
            if round % 2 == 0 {
                unsafe { acct.free(Some(ptr)) };
            } else {
                let usable = unsafe { acct.usable_size(ptr) };
                unsafe { acct.free_with_size(Some(ptr), usable) };
            }
        }
    }
    for (ptr, size) in live {
        assert!(check_pattern(ptr, size), "corruption before final free");
        unsafe { acct.free(Some(ptr)) };
    }
}

fn net_zero<const SLOTS: usize>(acct: &'static Accountant<SizeHeader<Malloc>, SLOTS>) {
    let before = acct.used_memory();
    let barrier = Barrier::new(THREADS);
    std::thread::scope(|s| {
        for t in 0 .. THREADS {
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                churn(acct, 0x2545_F491_4F6C_DD1D ^ (t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            });
        }
    });
    assert_eq!(before, acct.used_memory());
}

#[test] fn stress_wide()    { net_zero(&WIDE) }
#[test] fn stress_narrow()  { net_zero(&NARROW) }
#[test] fn stress_none()    { net_zero(&NONE) }

#[test] fn cross_thread_free() {
    static ACCT : Accountant<SizeHeader<Malloc>, 4> = Accountant::new(SizeHeader(Malloc));
    let before = ACCT.used_memory();

    // allocate everything on one set of threads, free it all on another
    let addrs : Vec<usize> = std::thread::scope(|s| {
        let handles : Vec<_> = (0 .. 8).map(|t| s.spawn(move || (0 .. 100).map(|i| ACCT.alloc(t * 100 + i).as_ptr() as usize).collect::<Vec<_>>())).collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });
    assert!(ACCT.used_memory() > before);

    std::thread::scope(|s| {
        for chunk in addrs.chunks(37) {
            s.spawn(move || for &addr in chunk { unsafe { ACCT.free(NonNull::new(addr as *mut MaybeUninit<u8>)) } });
        }
    });
    assert_eq!(before, ACCT.used_memory());
}
