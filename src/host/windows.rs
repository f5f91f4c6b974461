#![cfg(all(windows, feature = "win32"))]

use super::HostMemory;

use winapi::shared::minwindef::DWORD;
use winapi::um::processthreadsapi::{GetCurrentProcess, GetCurrentProcessId};
use winapi::um::psapi::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS, PROCESS_MEMORY_COUNTERS_EX};
use winapi::um::sysinfoapi::{GetSystemInfo, GlobalMemoryStatusEx, MEMORYSTATUSEX, SYSTEM_INFO};

use core::mem::{size_of, zeroed};



/// psapi and `GlobalMemoryStatusEx` queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] pub struct Windows;

impl Windows {
    fn counters() -> Option<PROCESS_MEMORY_COUNTERS_EX> {
        // SAFETY: ✔️ plain old data
        let mut pmc : PROCESS_MEMORY_COUNTERS_EX = unsafe { zeroed() };
        pmc.cb = size_of::<PROCESS_MEMORY_COUNTERS_EX>() as DWORD;
        // SAFETY: ✔️ `GetCurrentProcess()` is a pseudo handle that needs no closing
        // SAFETY: ✔️ `pmc` is a `PROCESS_MEMORY_COUNTERS_EX`, which `GetProcessMemoryInfo` accepts in place of `PROCESS_MEMORY_COUNTERS` when `cb` says so
        let ok = unsafe { GetProcessMemoryInfo(GetCurrentProcess(), (&mut pmc as *mut PROCESS_MEMORY_COUNTERS_EX).cast::<PROCESS_MEMORY_COUNTERS>(), pmc.cb) };
        if ok == 0 {
            log::warn!("GetProcessMemoryInfo failed: error {}", crate::allocator::win32::get_last_error());
            return None;
        }
        Some(pmc)
    }
}

impl HostMemory for Windows {
    fn resident_bytes(&self) -> usize { Self::counters().map_or(0, |pmc| pmc.WorkingSetSize) }

    fn physical_bytes(&self) -> usize {
        // SAFETY: ✔️ plain old data
        let mut status : MEMORYSTATUSEX = unsafe { zeroed() };
        status.dwLength = size_of::<MEMORYSTATUSEX>() as DWORD;
        // SAFETY: ✔️ `status` is a properly sized `MEMORYSTATUSEX`
        if unsafe { GlobalMemoryStatusEx(&mut status) } == 0 {
            log::warn!("GlobalMemoryStatusEx failed: error {}", crate::allocator::win32::get_last_error());
            return 0;
        }
        usize::try_from(status.ullTotalPhys).unwrap_or(usize::MAX)
    }

    /// Only this process can be queried: any other `pid` reports `0`.
    fn private_dirty_bytes(&self, pid: Option<u32>) -> usize {
        // SAFETY: ✔️ no preconditions
        if pid.is_some_and(|pid| pid != unsafe { GetCurrentProcessId() }) { return 0 }
        Self::counters().map_or(0, |pmc| pmc.PrivateUsage)
    }

    fn page_size(&self) -> usize {
        // SAFETY: ✔️ plain old data
        let mut info : SYSTEM_INFO = unsafe { zeroed() };
        // SAFETY: ✔️ `info` is a `SYSTEM_INFO`, and `GetSystemInfo` can't fail
        unsafe { GetSystemInfo(&mut info) };
        info.dwPageSize as usize
    }
}



#[test] fn queries() {
    let windows = Windows;
    assert!(windows.resident_bytes() > 0);
    assert!(windows.physical_bytes() >= windows.resident_bytes());
    assert!(windows.private_dirty_bytes(None) > 0);
    assert_eq!(0, windows.private_dirty_bytes(Some(u32::MAX)));
    assert!(windows.page_size().is_power_of_two());
}
