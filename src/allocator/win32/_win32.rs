#![cfg(all(target_os = "windows", feature = "win32"))]
//! [`ProcessHeap`]
//!
//! | Rust                                  | Win32                                         |
//! | --------------------------------------| ----------------------------------------------|
//! | [`thin::Alloc::alloc_uninit`]         | <code>HeapAlloc(GetProcessHeap(), 0, size)</code>
//! | [`thin::Alloc::alloc_zeroed`]         | <code>HeapAlloc(GetProcessHeap(), HEAP_ZERO_MEMORY, size)</code>
//! | [`thin::Realloc::realloc_uninit`]     | <code>HeapReAlloc(GetProcessHeap(), 0, ptr, size)</code>
//! | [`thin::Free::free`]                  | <code>HeapFree(GetProcessHeap(), 0, ptr)</code>
//! | [`thin::SizeOf::size_of`]             | <code>HeapSize(GetProcessHeap(), 0, ptr)</code>
//! | [`thin::Introspect::purge`]           | <code>HeapCompact(GetProcessHeap(), 0)</code>

#[cfg(doc)] use crate::*;

mod heap;               pub use heap::*;

/// | Arch      | Value |
/// | ----------| -----:|
/// | i686      |  8    |
/// | x86_64    | 16    |
const MEMORY_ALLOCATION_ALIGNMENT : usize = winapi::um::winnt::MEMORY_ALLOCATION_ALIGNMENT;

/// <code>[SetLastError](https://learn.microsoft.com/en-us/windows/win32/api/errhandlingapi/nf-errhandlingapi-setlasterror)\(0\)</code>
fn clear_last_error() {
    // SAFETY: ✔️ if writing this TLS var is ever unsafe, something has gone *horrifically* wrong.
    unsafe { winapi::um::errhandlingapi::SetLastError(0) };
}

/// [`GetLastError`](https://learn.microsoft.com/en-us/windows/win32/api/errhandlingapi/nf-errhandlingapi-getlasterror)
pub(crate) fn get_last_error() -> u32 {
    // SAFETY: ✔️ if accessing this TLS var is ever unsafe, something has gone *horrifically* wrong.
    unsafe { winapi::um::errhandlingapi::GetLastError() }
}
