//! Installs the process-wide accountant as the Rust global allocator, so `Vec`, `Box`, `String`... are all accounted.
//!
//! The harness itself reports results over a channel, so merely reaching a test proves over-aligned layouts work.

use tallyalloc::global::{self, Global, GLOBAL};

#[global_allocator] static ALLOC : &Global = &GLOBAL;

const MIB : usize = 1 << 20;

// One #[test] fn, so the harness isn't allocating on other threads while totals are compared
#[test] fn global_allocator() {
    let base = global::used_memory();
    assert!(base > 0, "the test harness has allocated *something* by now");

    let v = vec![0u8; 16 * MIB];
    let with_vec = global::used_memory();
    assert!(with_vec >= base + 16 * MIB, "{with_vec} < {base} + 16 MiB");

    let mut v = v;
    v.resize(32 * MIB, 1);
    assert!(global::used_memory() >= base + 32 * MIB);
    assert_eq!(1, v[32 * MIB - 1]);

    drop(v);
    let after = global::used_memory();
    assert!(after < base + MIB, "{after} >= {base} + 1 MiB after dropping everything");

    // alignment beyond the backend's is served, not refused
    #[repr(align(4096))] struct Page([u8; 4096]);
    let pages : Vec<Box<Page>> = (0 .. 16).map(|i| Box::new(Page([i as u8; 4096]))).collect();
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(0, &**page as *const Page as usize % 4096);
        assert!(page.0.iter().all(|b| *b == i as u8));
    }
    assert!(global::used_memory() >= base + 16 * 4096);
    drop(pages);

    // std's channels box 128-byte aligned counters
    let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
    let sender = std::thread::spawn(move || for i in 0 .. 100 { tx.send(vec![i as u8; 1000]).unwrap() });
    let received : usize = rx.iter().map(|v| v.len()).sum();
    sender.join().unwrap();
    assert_eq!(100 * 1000, received);

    let threads : Vec<_> = (0 .. 8).map(|i| std::thread::spawn(move || vec![i as u8; MIB])).collect();
    let vecs : Vec<Vec<u8>> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    assert!(global::used_memory() >= base + 8 * MIB);
    drop(vecs);
    assert!(global::used_memory() < base + 2 * MIB);
}
