//! [`OomPolicy`]: what the or-fail allocation forms do when memory can't be had.
//!
//! The `try_*` forms of [`Accountant`](crate::Accountant) never consult this; they return an
//! [`AllocError`](crate::error::AllocError) instead.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};



/// Called with the size that couldn't be allocated.  Must not return.
///
/// To recover instead of exiting, a handler may [`panic!`] and let the caller unwind.
pub type OomHandler = fn(size: usize) -> !;

/// Log, report the failed size on stderr, then abort the process.
///
/// The report reads: `tallyalloc: Out of memory trying to allocate {size} bytes`
pub fn default_handler(size: usize) -> ! {
    use std::io::Write;
    log::error!("out of memory trying to allocate {size} bytes");
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "tallyalloc: Out of memory trying to allocate {size} bytes");
    let _ = stderr.flush();
    std::process::abort()
}

/// A replaceable [`OomHandler`].
///
/// Replacing the handler is lock-free and may race with allocation failures on other threads;
/// each failure calls whichever handler it observes.
pub struct OomPolicy {
    // null means `default_handler`, so `new` can be `const`
    handler: AtomicPtr<()>,
}

impl OomPolicy {
    /// A policy using [`default_handler`].
    pub const fn new() -> Self { Self { handler: AtomicPtr::new(ptr::null_mut()) } }

    /// A policy using `handler`.
    pub fn with(handler: OomHandler) -> Self {
        let policy = Self::new();
        policy.set(handler);
        policy
    }

    /// Replace the handler for all future failures.
    pub fn set(&self, handler: OomHandler) {
        log::debug!("replacing out of memory handler");
        self.handler.store(handler as *mut (), Ordering::Release);
    }

    /// The handler future failures will call.
    pub fn get(&self) -> OomHandler {
        let handler = self.handler.load(Ordering::Acquire);
        if handler.is_null() { return default_handler }
        // SAFETY: ✔️ the only non-null values ever stored are `OomHandler`s, by `set`
        unsafe { core::mem::transmute::<*mut (), OomHandler>(handler) }
    }

    /// Invoke the current handler for a failed request of `size` bytes.
    #[cold] #[inline(never)] pub fn fail(&self, size: usize) -> ! {
        (self.get())(size)
    }
}

impl Default for OomPolicy {
    fn default() -> Self { Self::new() }
}

impl core::fmt::Debug for OomPolicy {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_struct("OomPolicy").field("handler", &self.handler.load(Ordering::Relaxed)).finish()
    }
}



#[cfg(test)] fn panicking(size: usize) -> ! { panic!("oom: {size}") }

#[test] fn default_is_default_handler() {
    assert_eq!(OomPolicy::new().get() as usize, default_handler as OomHandler as usize);
}

#[test] fn set_then_get() {
    let policy = OomPolicy::new();
    policy.set(panicking);
    assert_eq!(policy.get() as usize, panicking as OomHandler as usize);
    assert_eq!(OomPolicy::with(panicking).get() as usize, panicking as OomHandler as usize);
}

#[test] #[should_panic(expected = "oom: 12345")] fn fail_calls_handler() {
    OomPolicy::with(panicking).fail(12345)
}
