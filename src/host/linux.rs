#![cfg(all(target_os = "linux", feature = "c"))]

use super::HostMemory;

use core::ptr::NonNull;
use std::fs::File;
use std::io::{BufRead, BufReader};



/// procfs and `sysconf` queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)] pub struct Linux;

impl Linux {
    /// Sum `field` (e.g. `"Rss:"`, `"Private_Dirty:"`, with the trailing colon) over every mapping in `/proc/<pid>/smaps`, in bytes.
    pub fn smaps_bytes(&self, field: &str, pid: Option<u32>) -> usize {
        let path = match pid {
            None        => std::string::String::from("/proc/self/smaps"),
            Some(pid)   => std::format!("/proc/{pid}/smaps"),
        };
        match File::open(&path) {
            Ok(file) => sum_smaps_field(BufReader::new(file), field),
            Err(err) => { log::debug!("reading {path} failed: {err}"); 0 },
        }
    }
}

impl HostMemory for Linux {
    fn resident_bytes(&self) -> usize {
        let stat = match std::fs::read_to_string("/proc/self/stat") {
            Ok(stat) => stat,
            Err(err) => { log::warn!("reading /proc/self/stat failed: {err}"); return 0 },
        };
        let Some(pages) = stat_field(&stat, 24) else { log::warn!("/proc/self/stat has no rss field"); return 0 };
        pages.saturating_mul(sysconf(libc::_SC_PAGESIZE))
    }

    fn physical_bytes(&self) -> usize {
        sysconf(libc::_SC_PHYS_PAGES).saturating_mul(sysconf(libc::_SC_PAGESIZE))
    }

    fn private_dirty_bytes(&self, pid: Option<u32>) -> usize {
        self.smaps_bytes("Private_Dirty:", pid)
    }

    fn page_size(&self) -> usize { sysconf(libc::_SC_PAGESIZE) }

    unsafe fn release_pages(&self, ptr: NonNull<u8>, len: usize) -> usize {
        let page = self.page_size();
        let Some((start, pages)) = whole_pages(ptr.as_ptr() as usize, len, page) else { return 0 };
        // SAFETY: ✔️ `[start, start + pages)` lies within `ptr[..len]`, which the caller has given up per the fn's preconditions
        if unsafe { libc::madvise(start as *mut libc::c_void, pages, libc::MADV_DONTNEED) } != 0 {
            log::warn!("madvise(MADV_DONTNEED) of {pages} bytes failed: {}", std::io::Error::last_os_error());
            return 0;
        }
        pages
    }
}

fn sysconf(name: libc::c_int) -> usize {
    // SAFETY: ✔️ `sysconf` has no preconditions, unknown names report -1
    let value = unsafe { libc::sysconf(name) };
    usize::try_from(value).unwrap_or(0)
}

/// The first page boundary at or after `addr`, and how many bytes of whole pages follow it within `addr .. addr + len`.
fn whole_pages(addr: usize, len: usize, page: usize) -> Option<(usize, usize)> {
    if !page.is_power_of_two() { return None }
    let start = addr.checked_next_multiple_of(page)?;
    let pages = len.checked_sub(start - addr)? & !(page - 1);
    if pages == 0 { return None }
    Some((start, pages))
}

/// The 1-based field `n` of a `/proc/<pid>/stat` line, as documented by proc(5).
///
/// The command name (field 2) is parenthesized and may itself contain spaces or parens,
/// so fields are counted from the *last* `)`.
fn stat_field(stat: &str, n: usize) -> Option<usize> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_ascii_whitespace().nth(n.checked_sub(3)?)?.parse().ok()
}

/// Sum every `field   123 kB` line, in bytes.
fn sum_smaps_field(smaps: impl BufRead, field: &str) -> usize {
    smaps.lines()
        .map_while(Result::ok)
        .filter_map(|line| {
            let kb = line.strip_prefix(field)?.trim().strip_suffix("kB")?.trim().parse::<usize>().ok()?;
            Some(kb * 1024)
        })
        .fold(0usize, usize::saturating_add)
}



#[test] fn parse_stat() {
    let stat = "1234 (my (odd) prog) S 1 1234 1234 0 -1 4194560 1000 0 0 0 10 5 0 0 20 0 4 0 12345 567890123 4321 18446744073709551615 1 1 0 0 0 0 0 4096 0 0 0 0 17 3 0 0 0 0 0";
    assert_eq!(Some(1), stat_field(stat, 4));
    assert_eq!(Some(567890123), stat_field(stat, 23));
    assert_eq!(Some(4321), stat_field(stat, 24));
    assert_eq!(None, stat_field(stat, 2));
    assert_eq!(None, stat_field("no parens here", 24));
    assert_eq!(None, stat_field("1 (short) S 1", 24));
}

#[test] fn page_rounding() {
    assert_eq!(Some((4096, 4096)),      whole_pages(4096, 4096, 4096));
    assert_eq!(Some((8192, 4096)),      whole_pages(4097, 8191, 4096));
    assert_eq!(None,                    whole_pages(4097, 8190, 4096));
    assert_eq!(Some((8192, 3 * 4096)),  whole_pages(8000, 192 + 3 * 4096 + 100, 4096));
    assert_eq!(None,                    whole_pages(0, 4095, 4096));
    assert_eq!(None,                    whole_pages(4096, 4096, 0));
}

#[test] fn parse_smaps() {
    let smaps = "\
00400000-0040b000 r-xp 00000000 08:01 1234 /bin/cat
Size:                 44 kB
Rss:                  40 kB
Private_Dirty:         4 kB
7fff0000-7fff1000 rw-p 00000000 00:00 0 [stack]
Size:                  4 kB
Rss:                   4 kB
Private_Dirty:        12 kB
Private_Dirty_Bogus:  99 kB
";
    assert_eq!(16 * 1024, sum_smaps_field(smaps.as_bytes(), "Private_Dirty:"));
    assert_eq!(44 * 1024, sum_smaps_field(smaps.as_bytes(), "Rss:"));
    assert_eq!(0, sum_smaps_field(smaps.as_bytes(), "AnonHugePages:"));
}

#[test] fn queries() {
    let linux = Linux;
    assert!(linux.resident_bytes() > 0);
    assert!(linux.physical_bytes() >= linux.resident_bytes());
    assert!(linux.smaps_bytes("Rss:", None) > 0);
    assert_eq!(0, linux.private_dirty_bytes(Some(u32::MAX)));
    assert!(linux.page_size().is_power_of_two());
}
