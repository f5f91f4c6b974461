//! [`HostMemory`]: what the operating system thinks of this process's memory use.
//!
//! | Query                                             | Linux                                 | Windows                                   | Elsewhere |
//! | --------------------------------------------------| --------------------------------------| ------------------------------------------| ----------|
//! | [`resident_bytes`](HostMemory::resident_bytes)    | `/proc/self/stat` field 24 × page     | `PROCESS_MEMORY_COUNTERS::WorkingSetSize` | `0`
//! | [`physical_bytes`](HostMemory::physical_bytes)    | `_SC_PHYS_PAGES` × `_SC_PAGESIZE`     | `MEMORYSTATUSEX::ullTotalPhys`            | `0`
//! | [`private_dirty_bytes`](HostMemory::private_dirty_bytes) | `Private_Dirty:` in `/proc/<pid>/smaps` | `PrivateUsage` (own process only)  | `0`
//! | [`page_size`](HostMemory::page_size)              | `_SC_PAGESIZE`                        | `SYSTEM_INFO::dwPageSize`                 | `0`
//! | [`release_pages`](HostMemory::release_pages)      | `madvise(MADV_DONTNEED)`              | `0`                                       | `0`
//!
//! The queries are slow, rare, diagnostic queries (reading `smaps` can take a second on large processes),
//! never something to call on an allocation path.  Every query returns `0` when the facility is missing or fails.

/// Operating system memory queries.  See the [module docs](self).
pub trait HostMemory {
    /// Bytes of this process resident in physical memory.
    fn resident_bytes(&self) -> usize { 0 }

    /// Bytes of physical memory installed.
    fn physical_bytes(&self) -> usize { 0 }

    /// Bytes in private, dirty pages of process `pid` (`None` for this process).
    fn private_dirty_bytes(&self, pid: Option<u32>) -> usize { let _ = pid; 0 }

    /// Bytes per virtual memory page.
    fn page_size(&self) -> usize { 0 }

    /// Hand the whole pages inside `ptr[..len]` back to the OS, returning how many bytes that covered.
    ///
    /// The range stays mapped, and reads as zeros once touched again.
    ///
    /// ### Safety
    /// *   `ptr[..len]` must be private anonymous memory (e.g. an allocation) whose contents nobody needs anymore
    unsafe fn release_pages(&self, ptr: core::ptr::NonNull<u8>, len: usize) -> usize { let _ = (ptr, len); 0 }
}

/// A host with no supported queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] pub struct Unsupported;
impl HostMemory for Unsupported {}

mod linux;      #[cfg(all(target_os = "linux", feature = "c"))] pub use linux::Linux;
mod windows;    #[cfg(all(windows, feature = "win32"))] pub use windows::Windows;

#[cfg(all(target_os = "linux", feature = "c"))]                             pub type Host = Linux;
#[cfg(all(windows, feature = "win32"))]                                     pub type Host = Windows;
#[cfg(not(any(all(target_os = "linux", feature = "c"), all(windows, feature = "win32"))))] pub type Host = Unsupported;

/// <code>[Host].[resident_bytes](HostMemory::resident_bytes)\(\)</code>
pub fn resident_bytes() -> usize { Host::default().resident_bytes() }

/// <code>[Host].[physical_bytes](HostMemory::physical_bytes)\(\)</code>
pub fn physical_bytes() -> usize { Host::default().physical_bytes() }

/// <code>[Host].[private_dirty_bytes](HostMemory::private_dirty_bytes)\(pid\)</code>
pub fn private_dirty_bytes(pid: Option<u32>) -> usize { Host::default().private_dirty_bytes(pid) }



#[test] fn unsupported() {
    assert_eq!(0, Unsupported.resident_bytes());
    assert_eq!(0, Unsupported.physical_bytes());
    assert_eq!(0, Unsupported.private_dirty_bytes(None));
    assert_eq!(0, Unsupported.page_size());
    let mut page = [0xFFu8; 64];
    assert_eq!(0, unsafe { Unsupported.release_pages(core::ptr::NonNull::from(&mut page).cast(), 64) });
    assert!(page.iter().all(|b| *b == 0xFF));
}

#[cfg(any(all(target_os = "linux", feature = "c"), all(windows, feature = "win32")))] #[test] fn host() {
    let resident = resident_bytes();
    let physical = physical_bytes();
    assert!(resident > 0);
    assert!(physical > resident);
    assert!(private_dirty_bytes(None) < physical);
    assert!(Host::default().page_size().is_power_of_two());
}
