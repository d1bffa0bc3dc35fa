//! Thin wrappers around the two OS memory-acquisition primitives this
//! allocator is built on, plus the single fatal-abort channel both of
//! them funnel into on failure.

use std::ptr;

use log::{error, trace};

use crate::align::HEADER_SIZE;
use crate::block::{payload_of, BlockMeta};
use crate::list;

/// Logs the failing syscall and its `errno`, then terminates the process.
///
/// The allocator has already committed to `brk` or `mmap`/`munmap` by the
/// time this is called, so the in-band list may be mid-mutation; there is
/// no meaningful recovery at this layer.
pub fn fatal(syscall: &str) -> ! {
    error!(
        "{syscall} failed: {}",
        std::io::Error::last_os_error()
    );
    std::process::abort();
}

/// Satisfies a brk-owned request of `size` payload bytes: first tries to
/// grow the tail in place, then falls back to extending the break and
/// linking a fresh block.
///
/// # Safety
/// Must only be called while the list is in a consistent state; a
/// failing `sbrk` call here is fatal.
pub unsafe fn sbrk_allocate(size: usize) -> *mut u8 {
    unsafe {
        let expanded = list::try_expand_tail(size);
        if !expanded.is_null() {
            return expanded;
        }

        let total_size = size + HEADER_SIZE;
        let raw = libc::sbrk(total_size as libc::intptr_t);
        if raw == usize::MAX as *mut libc::c_void {
            fatal("sbrk");
        }
        let header = raw as *mut BlockMeta;

        if list::is_empty() {
            list::init(header, size);
        } else {
            list::append(header, size);
        }

        trace!("syscall: sbrk grew heap by {total_size} bytes");
        payload_of(header, 0)
    }
}

/// Maps a fresh anonymous, private region of `total_size` bytes and writes
/// a `Mapped` header of `size` payload bytes at its start.
///
/// # Safety
/// A failing `mmap` call is fatal.
pub unsafe fn mmap_allocate(total_size: usize, size: usize) -> *mut u8 {
    unsafe {
        let raw = libc::mmap(
            ptr::null_mut(),
            total_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if raw == libc::MAP_FAILED {
            fatal("mmap");
        }

        let header = raw as *mut BlockMeta;
        list::mmap_fill(header, size);
        trace!("syscall: mmap'd {total_size} bytes");
        payload_of(header, 0)
    }
}
