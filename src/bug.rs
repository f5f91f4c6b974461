//! Panics for misuse that would otherwise corrupt the heap or the byte count

use core::ffi::c_void;
use core::mem::MaybeUninit;
use core::ptr::NonNull;



/// Any pointer an allocator might be handed back, for reporting.
pub trait AsPtr : Copy { fn as_ptr(self) -> *mut c_void; }
impl AsPtr for NonNull<MaybeUninit<u8>> { fn as_ptr(self) -> *mut c_void { self.as_ptr().cast() } }

/// Report bugs that indicate Undefined Behavior
///
/// Once one of these fires, [`used_memory`](crate::Accountant::used_memory) can't be trusted either.
pub mod ub {
    use super::*;

    #[track_caller] #[inline(never)] pub fn invalid_ptr_for_allocator(ptr: impl AsPtr) -> ! {
        let ptr = ptr.as_ptr();
        panic!("bug: undefined behavior: {ptr:?} wasn't allocated by this backend");
    }

    #[track_caller] #[inline(never)] pub fn free_failed(ptr: impl AsPtr) -> ! {
        let ptr = ptr.as_ptr();
        panic!("bug: undefined behavior: the backend refused to free {ptr:?} (foreign pointer, double free, or heap corruption)");
    }

    #[track_caller] #[inline(never)] pub fn corrupt_size_header(ptr: impl AsPtr, header: usize) -> ! {
        let ptr = ptr.as_ptr();
        panic!("bug: undefined behavior: {ptr:?} claims {header} usable bytes, more than could ever be allocated (double free, or heap corruption?)");
    }
}
