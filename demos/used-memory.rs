//! Route every Rust allocation through tallyalloc, then report what the accountant, the backend,
//! and the operating system each think is in use.
//!
//! ```text
//! cargo run --example used-memory --features jemalloc
//! ```

use tallyalloc::global::{self, Global, GLOBAL};
use tallyalloc::host;

#[global_allocator] static ALLOC : &Global = &GLOBAL;

fn report(label: &str) {
    let info = GLOBAL.allocator_info();
    println!("{label}:");
    println!("    used_memory     {:>12}", global::used_memory());
    println!("    allocated       {:>12}", info.allocated);
    println!("    active          {:>12}", info.active);
    println!("    resident        {:>12}", info.resident);
    println!("    retained        {:>12}", info.retained);
    println!("    muzzy           {:>12}", info.muzzy);
    println!("    rss             {:>12}", host::resident_bytes());
    println!("    private dirty   {:>12}", host::private_dirty_bytes(None));
    println!();
}

/// tallyalloc only logs off the allocation path, so a logger that allocates is fine.
struct Stderr;
impl log::Log for Stderr {
    fn enabled(&self, _: &log::Metadata) -> bool { true }
    fn log(&self, record: &log::Record) { eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args()) }
    fn flush(&self) {}
}

fn oom(size: usize) -> ! {
    eprintln!("used-memory: couldn't allocate {size} bytes, giving up");
    std::process::exit(1)
}

fn main() {
    let _ = log::set_logger(&Stderr).map(|()| log::set_max_level(log::LevelFilter::Debug));
    global::set_oom_handler(oom);
    println!("physical memory: {} bytes", host::physical_bytes());
    println!();
    report("startup");

    let blocks : Vec<Vec<u64>> = (0 .. 64).map(|i| vec![i; 16 * 1024]).collect();
    report("64 x 128 KiB");

    let copy = GLOBAL.dup_cstr(c"hello from tallyalloc");
    // SAFETY: ✔️ `copy` came from `GLOBAL` and is still live
    println!("dup_cstr: {} usable bytes", unsafe { GLOBAL.usable_size(copy.cast()) });
    // SAFETY: ✔️ `copy` came from `GLOBAL` and is still live
    unsafe { GLOBAL.free(Some(copy.cast())) };

    drop(blocks);
    report("dropped");

    GLOBAL.set_background_thread(true);
    println!("purge: {:?}", GLOBAL.purge());
    report("purged");
}
